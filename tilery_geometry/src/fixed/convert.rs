use super::{FixedBox, FixedCoord, FixedXy, MAP_SIZE, TILE_PIXELS};
use std::f64::consts::PI;
use tilery_core::Tile;

/// Projects a WGS84 coordinate into the fixed Web-Mercator plane at zoom 20.
///
/// Lossy but deterministic: the result is rounded to the nearest fixed unit
/// and clamped to the plane.
pub fn latlng_to_fixed(lat: f64, lng: f64) -> FixedXy {
	let size = MAP_SIZE as f64;
	let x = (lng + 180.0) / 360.0 * size;

	let lat = lat.clamp(-85.0511287798066, 85.0511287798066);
	let sin = (lat * PI / 180.0).sin();
	let y = (0.5 - ((1.0 + sin) / (1.0 - sin)).ln() / (4.0 * PI)) * size;

	FixedXy {
		x: (x.round() as FixedCoord).clamp(0, MAP_SIZE - 1),
		y: (y.round() as FixedCoord).clamp(0, MAP_SIZE - 1),
	}
}

/// Inverse projection, returning `(lat, lng)`.
pub fn fixed_to_latlng(pos: FixedXy) -> (f64, f64) {
	let size = MAP_SIZE as f64;
	let lng = (pos.x as f64) / size * 360.0 - 180.0;
	let n = PI * (1.0 - 2.0 * (pos.y as f64) / size);
	let lat = (0.5 * (n.exp() - (-n).exp())).atan().to_degrees();
	(lat, lng)
}

/// The pixel bounds of a tile at its own zoom level.
pub fn tile_pixel_bounds(tile: &Tile) -> FixedBox {
	let min = FixedXy::new(
		FixedCoord::from(tile.x) * TILE_PIXELS,
		FixedCoord::from(tile.y) * TILE_PIXELS,
	);
	FixedBox::new(min, FixedXy::new(min.x + TILE_PIXELS, min.y + TILE_PIXELS))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn origin_and_corners() {
		assert_eq!(latlng_to_fixed(85.0511287798066, -180.0), FixedXy::new(0, 0));

		let center = latlng_to_fixed(0.0, 0.0);
		assert_eq!(center, FixedXy::new(MAP_SIZE / 2, MAP_SIZE / 2));

		let se = latlng_to_fixed(-85.06, 180.0);
		assert_eq!(se.x, MAP_SIZE - 1);
		assert_eq!(se.y, MAP_SIZE - 1);
	}

	#[test]
	fn roundtrip() {
		for (lat, lng) in [
			(49.87805785566374, 8.654533624649048),
			(-16.7935583, 179.9997797),
			(52.5, 13.4),
		] {
			let fixed = latlng_to_fixed(lat, lng);
			let (lat2, lng2) = fixed_to_latlng(fixed);
			assert!((lat - lat2).abs() < 1e-6, "lat {lat} vs {lat2}");
			assert!((lng - lng2).abs() < 1e-6, "lng {lng} vs {lng2}");
		}
	}

	#[test]
	fn pixel_bounds() {
		let bounds = tile_pixel_bounds(&Tile::new(1, 2, 3));
		assert_eq!(bounds.min, FixedXy::new(4096, 8192));
		assert_eq!(bounds.max, FixedXy::new(8192, 12288));
	}
}
