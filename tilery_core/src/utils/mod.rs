mod compression;
mod parse_tile_url;
mod timer;

pub use compression::{compress_deflate, decompress_deflate};
pub use parse_tile_url::parse_tile_url;
pub use timer::ScopedTimer;
