mod blob;
mod byte_range;
mod tile;

pub use blob::Blob;
pub use byte_range::ByteRange;
pub use tile::Tile;
