mod area;
mod clip;
mod codec;
mod convert;
mod delta;
mod simplify;
mod types;

pub use area::area;
pub use clip::{clip, union_polygons};
pub use codec::{deserialize, deserialize_at_zoom, serialize};
pub use convert::{fixed_to_latlng, latlng_to_fixed, tile_pixel_bounds};
pub use delta::{DeltaDecoder, DeltaEncoder};
pub use simplify::{make_simplify_mask, SimplifyMaskReader};
pub use types::*;
