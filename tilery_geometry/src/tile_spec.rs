use crate::fixed::{tile_pixel_bounds, FixedBox, MAX_ZOOM, OVERDRAW};
use anyhow::{ensure, Result};
use tilery_core::Tile;

/// Render style bands, coarse to fine lookup: a tile at `z >= 14` renders
/// with the `high` band, everything below with `mid`.
pub const ZOOM_LEVEL_NAMES: [&str; 2] = ["high", "mid"];
pub const ZOOM_LEVEL_BASES: [u32; 2] = [14, 10];

/// The different coordinate frames of one tile: its pixel bounds at its own
/// zoom, the same box expanded to the zoom 20 fixed plane, and the expanded
/// box grown by the overdraw margin used for clipping.
#[derive(Clone, Copy, Debug)]
pub struct TileSpec {
	pub tile: Tile,
	pub delta_z: u32,
	pub pixel_bounds: FixedBox,
	pub bounds: FixedBox,
	pub overdraw_bounds: FixedBox,
}

impl TileSpec {
	pub fn new(tile: Tile) -> Result<TileSpec> {
		ensure!(tile.z <= MAX_ZOOM, "invalid zoom level {}", tile.z);
		let delta_z = MAX_ZOOM - tile.z;

		let pixel_bounds = tile_pixel_bounds(&tile);
		let bounds = FixedBox::new(
			(
				pixel_bounds.min.x << delta_z,
				pixel_bounds.min.y << delta_z,
			)
				.into(),
			(
				pixel_bounds.max.x << delta_z,
				pixel_bounds.max.y << delta_z,
			)
				.into(),
		);

		Ok(TileSpec {
			tile,
			delta_z,
			pixel_bounds,
			bounds,
			overdraw_bounds: bounds.grown(OVERDRAW),
		})
	}

	/// The style band of this tile's zoom level.
	pub fn z_str(&self) -> &'static str {
		for (name, base) in ZOOM_LEVEL_NAMES.iter().zip(ZOOM_LEVEL_BASES) {
			if self.tile.z >= base {
				return name;
			}
		}
		ZOOM_LEVEL_NAMES[ZOOM_LEVEL_NAMES.len() - 1]
	}
}
