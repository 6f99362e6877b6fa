use std::fmt::{self, Debug};

/// One coordinate component of the fixed-point Web-Mercator plane.
pub type FixedCoord = i64;

/// Pixels per tile edge in the fixed plane and in rendered vector tiles.
pub const TILE_PIXELS: FixedCoord = 4096;

/// Deepest zoom level of the fixed plane.
pub const MAX_ZOOM: u32 = 20;

/// Edge length of the whole fixed plane: `4096 << 20 == 2^32`.
pub const MAP_SIZE: FixedCoord = TILE_PIXELS << MAX_ZOOM;

/// Center of the fixed plane. Delta codecs are seeded with this offset so
/// coordinates near the middle of the map encode as short varints and the
/// first delta of a geometry stays symmetric around zero.
pub const FIXED_COORD_MAGIC_OFFSET: FixedCoord = MAP_SIZE / 2;

/// Extra margin added to tile clip boxes so stroked lines at the tile edge
/// render without seams.
pub const OVERDRAW: FixedCoord = 128;

/// Zoom level sentinel; fits a single byte as zig-zag varint.
pub const INVALID_ZOOM_LEVEL: u32 = 63;

#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct FixedXy {
	pub x: FixedCoord,
	pub y: FixedCoord,
}

impl FixedXy {
	pub fn new(x: FixedCoord, y: FixedCoord) -> FixedXy {
		FixedXy { x, y }
	}
}

impl From<(FixedCoord, FixedCoord)> for FixedXy {
	fn from((x, y): (FixedCoord, FixedCoord)) -> FixedXy {
		FixedXy { x, y }
	}
}

impl Debug for FixedXy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "({}, {})", self.x, self.y)
	}
}

/// An axis-aligned box in the fixed plane.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FixedBox {
	pub min: FixedXy,
	pub max: FixedXy,
}

impl FixedBox {
	pub fn new(min: FixedXy, max: FixedXy) -> FixedBox {
		FixedBox { min, max }
	}

	pub fn grown(&self, margin: FixedCoord) -> FixedBox {
		FixedBox {
			min: FixedXy::new(self.min.x - margin, self.min.y - margin),
			max: FixedXy::new(self.max.x + margin, self.max.y + margin),
		}
	}

	pub fn width(&self) -> FixedCoord {
		self.max.x - self.min.x
	}

	pub fn height(&self) -> FixedCoord {
		self.max.y - self.min.y
	}

	pub fn contains(&self, p: &FixedXy) -> bool {
		p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
	}

	pub fn intersects(&self, other: &FixedBox) -> bool {
		self.min.x <= other.max.x
			&& self.max.x >= other.min.x
			&& self.min.y <= other.max.y
			&& self.max.y >= other.min.y
	}
}

/// A multi-point: an ordered sequence of positions.
pub type FixedPoint = Vec<FixedXy>;

/// A multi-linestring: an ordered sequence of strings of positions.
pub type FixedPolyline = Vec<Vec<FixedXy>>;

/// One outer ring with zero or more inner rings. Rings are closed
/// (first == last) and carry at least four vertices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimplePolygon {
	pub outer: Vec<FixedXy>,
	pub inners: Vec<Vec<FixedXy>>,
}

/// A multi-polygon: an ordered sequence of simple polygons.
pub type FixedPolygon = Vec<SimplePolygon>;

/// The geometry attached to a feature. `Null` stands in for anything that
/// clipped or simplified away.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum FixedGeometry {
	#[default]
	Null,
	Point(FixedPoint),
	Polyline(FixedPolyline),
	Polygon(FixedPolygon),
}

impl FixedGeometry {
	pub fn is_null(&self) -> bool {
		matches!(self, FixedGeometry::Null)
	}

	/// The bounding box over all vertices, or `None` for `Null`.
	pub fn bounding_box(&self) -> Option<FixedBox> {
		let mut min = FixedXy::new(FixedCoord::MAX, FixedCoord::MAX);
		let mut max = FixedXy::new(FixedCoord::MIN, FixedCoord::MIN);
		let mut any = false;
		let mut extend = |p: &FixedXy| {
			min.x = min.x.min(p.x);
			min.y = min.y.min(p.y);
			max.x = max.x.max(p.x);
			max.y = max.y.max(p.y);
			any = true;
		};

		match self {
			FixedGeometry::Null => {}
			FixedGeometry::Point(points) => points.iter().for_each(&mut extend),
			FixedGeometry::Polyline(lines) => {
				lines.iter().flatten().for_each(&mut extend);
			}
			FixedGeometry::Polygon(polygons) => {
				for polygon in polygons {
					polygon.outer.iter().for_each(&mut extend);
					polygon.inners.iter().flatten().for_each(&mut extend);
				}
			}
		}

		any.then_some(FixedBox { min, max })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn plane_constants() {
		assert_eq!(MAP_SIZE, 1i64 << 32);
		assert_eq!(FIXED_COORD_MAGIC_OFFSET, 1i64 << 31);
	}

	#[test]
	fn box_queries() {
		let bbox = FixedBox::new(FixedXy::new(10, 10), FixedXy::new(20, 20));
		assert!(bbox.contains(&FixedXy::new(10, 20)));
		assert!(!bbox.contains(&FixedXy::new(9, 15)));
		assert!(bbox.intersects(&FixedBox::new(FixedXy::new(20, 20), FixedXy::new(30, 30))));
		assert!(!bbox.intersects(&FixedBox::new(FixedXy::new(21, 10), FixedXy::new(30, 30))));
		assert_eq!(bbox.grown(2).min, FixedXy::new(8, 8));
	}

	#[test]
	fn bounding_box() {
		assert_eq!(FixedGeometry::Null.bounding_box(), None);
		assert_eq!(FixedGeometry::Point(vec![]).bounding_box(), None);

		let line = FixedGeometry::Polyline(vec![vec![
			FixedXy::new(5, 80),
			FixedXy::new(42, 3),
		]]);
		let bbox = line.bounding_box().unwrap();
		assert_eq!(bbox.min, FixedXy::new(5, 3));
		assert_eq!(bbox.max, FixedXy::new(42, 80));
	}
}
