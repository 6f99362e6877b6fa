use crate::Tile;
use regex::Regex;
use std::sync::OnceLock;

const MAX_TILE_URL_ZOOM: u32 = 20;

/// Parses a tile request path of the form `/{z}/{x}/{y}.mvt`.
///
/// Returns `None` for anything that is not three decimal integers with
/// `z <= 20` and `(x, y)` inside the zoom level.
pub fn parse_tile_url(url: &str) -> Option<Tile> {
	static PATTERN: OnceLock<Regex> = OnceLock::new();
	let pattern = PATTERN.get_or_init(|| Regex::new(r"^/(\d+)/(\d+)/(\d+)\.mvt$").unwrap());

	let capture = pattern.captures(url)?;
	let z = capture[1].parse::<u32>().ok()?;
	let x = capture[2].parse::<u32>().ok()?;
	let y = capture[3].parse::<u32>().ok()?;

	if z > MAX_TILE_URL_ZOOM || x >= (1 << z) || y >= (1 << z) {
		return None;
	}
	Some(Tile::new(x, y, z))
}
