//! Fixed-point geometry for the tilery workspace.
//!
//! All geometry is kept in a signed 64-bit Web-Mercator plane at zoom 20
//! with 4096 pixels per tile edge. The modules cover conversion from
//! geographic coordinates, the delta-coded binary codec with per-zoom
//! simplification masks, clipping, area computation, tile pixel bounds and
//! Mapbox Vector Tile encoding.

pub mod fixed;
pub use fixed::*;
pub mod mvt;
pub mod tile_spec;
pub use tile_spec::TileSpec;
