//! Shared primitives for the tilery workspace: byte buffers, varint/PBF
//! readers and writers, slippy-map tile coordinates and small utilities.

pub mod io;
pub mod types;
pub use types::*;
pub mod utils;
pub use utils::*;
