use super::{FixedBox, FixedGeometry, FixedPolygon, FixedPolyline, FixedXy, SimplePolygon};
use geo::BooleanOps;

/// Intersects a geometry with an axis-aligned box.
///
/// Points survive only strictly inside the box. Polylines are clipped with
/// Liang-Barsky per segment, which may split one string into several parts.
/// Polygons run through a boolean intersection. Anything that ends up empty
/// becomes `Null`.
pub fn clip(geometry: &FixedGeometry, bbox: &FixedBox) -> FixedGeometry {
	match geometry {
		FixedGeometry::Null => FixedGeometry::Null,
		FixedGeometry::Point(points) => {
			let inside: Vec<FixedXy> = points
				.iter()
				.filter(|p| {
					p.x > bbox.min.x && p.x < bbox.max.x && p.y > bbox.min.y && p.y < bbox.max.y
				})
				.copied()
				.collect();
			if inside.is_empty() {
				FixedGeometry::Null
			} else {
				FixedGeometry::Point(inside)
			}
		}
		FixedGeometry::Polyline(lines) => {
			let clipped = clip_polyline(lines, bbox);
			if clipped.is_empty() {
				FixedGeometry::Null
			} else {
				FixedGeometry::Polyline(clipped)
			}
		}
		FixedGeometry::Polygon(polygons) => {
			let clipped = clip_polygon(polygons, bbox);
			if clipped.is_empty() {
				FixedGeometry::Null
			} else {
				FixedGeometry::Polygon(clipped)
			}
		}
	}
}

fn clip_polyline(lines: &FixedPolyline, bbox: &FixedBox) -> FixedPolyline {
	let mut out = Vec::new();

	for line in lines {
		let mut part: Vec<FixedXy> = Vec::new();
		for window in line.windows(2) {
			let (a, b) = (window[0], window[1]);
			match clip_segment(a, b, bbox) {
				None => flush(&mut part, &mut out),
				Some((p, q, entered, exited)) => {
					if entered {
						flush(&mut part, &mut out);
					}
					if part.is_empty() {
						part.push(p);
					}
					if q != *part.last().unwrap() {
						part.push(q);
					}
					if exited {
						flush(&mut part, &mut out);
					}
				}
			}
		}
		flush(&mut part, &mut out);
	}

	out
}

fn flush(part: &mut Vec<FixedXy>, out: &mut FixedPolyline) {
	if part.len() >= 2 {
		out.push(std::mem::take(part));
	} else {
		part.clear();
	}
}

/// Liang-Barsky segment clipping. Returns the clipped segment and whether
/// the start or end point was moved onto the box boundary.
fn clip_segment(a: FixedXy, b: FixedXy, bbox: &FixedBox) -> Option<(FixedXy, FixedXy, bool, bool)> {
	let dx = (b.x - a.x) as f64;
	let dy = (b.y - a.y) as f64;
	let mut t0 = 0.0f64;
	let mut t1 = 1.0f64;

	let edges = [
		(-dx, (a.x - bbox.min.x) as f64),
		(dx, (bbox.max.x - a.x) as f64),
		(-dy, (a.y - bbox.min.y) as f64),
		(dy, (bbox.max.y - a.y) as f64),
	];

	for (p, q) in edges {
		if p == 0.0 {
			if q < 0.0 {
				return None;
			}
		} else {
			let r = q / p;
			if p < 0.0 {
				if r > t1 {
					return None;
				}
				if r > t0 {
					t0 = r;
				}
			} else {
				if r < t0 {
					return None;
				}
				if r < t1 {
					t1 = r;
				}
			}
		}
	}

	let entered = t0 > 0.0;
	let exited = t1 < 1.0;
	let p = if entered {
		FixedXy::new(
			a.x + (dx * t0).round() as i64,
			a.y + (dy * t0).round() as i64,
		)
	} else {
		a
	};
	let q = if exited {
		FixedXy::new(
			a.x + (dx * t1).round() as i64,
			a.y + (dy * t1).round() as i64,
		)
	} else {
		b
	};
	Some((p, q, entered, exited))
}

/// The boolean union of two polygon sets.
pub fn union_polygons(a: &FixedPolygon, b: &FixedPolygon) -> FixedPolygon {
	let left = geo::MultiPolygon(a.iter().map(to_geo_polygon).collect());
	let right = geo::MultiPolygon(b.iter().map(to_geo_polygon).collect());
	left.union(&right)
		.0
		.into_iter()
		.filter_map(from_geo_polygon)
		.collect()
}

fn clip_polygon(polygons: &FixedPolygon, bbox: &FixedBox) -> FixedPolygon {
	let subject = geo::MultiPolygon(polygons.iter().map(to_geo_polygon).collect());
	let window = geo::MultiPolygon(vec![geo::Rect::new(
		geo::coord! { x: bbox.min.x as f64, y: bbox.min.y as f64 },
		geo::coord! { x: bbox.max.x as f64, y: bbox.max.y as f64 },
	)
	.to_polygon()]);

	subject
		.intersection(&window)
		.0
		.into_iter()
		.filter_map(from_geo_polygon)
		.collect()
}

fn to_geo_polygon(polygon: &SimplePolygon) -> geo::Polygon<f64> {
	let ring = |points: &[FixedXy]| {
		geo::LineString(
			points
				.iter()
				.map(|p| geo::coord! { x: p.x as f64, y: p.y as f64 })
				.collect(),
		)
	};
	geo::Polygon::new(
		ring(&polygon.outer),
		polygon.inners.iter().map(|inner| ring(inner)).collect(),
	)
}

fn from_geo_polygon(polygon: geo::Polygon<f64>) -> Option<SimplePolygon> {
	let ring = |line: &geo::LineString<f64>| -> Vec<FixedXy> {
		let mut points: Vec<FixedXy> = line
			.coords()
			.map(|c| FixedXy::new(c.x.round() as i64, c.y.round() as i64))
			.collect();
		points.dedup();
		if points.len() >= 2 && points.first() != points.last() {
			let first = points[0];
			points.push(first);
		}
		points
	};

	let (exterior, interiors) = polygon.into_inner();
	let outer = ring(&exterior);
	if outer.len() < 4 {
		return None;
	}
	Some(SimplePolygon {
		outer,
		inners: interiors
			.iter()
			.map(ring)
			.filter(|inner| inner.len() >= 4)
			.collect(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn bbox() -> FixedBox {
		FixedBox::new(FixedXy::new(10, 10), FixedXy::new(20, 20))
	}

	#[test]
	fn points_strictly_inside() {
		assert_eq!(
			clip(&FixedGeometry::Point(vec![FixedXy::new(42, 23)]), &bbox()),
			FixedGeometry::Null
		);
		assert_eq!(
			clip(&FixedGeometry::Point(vec![FixedXy::new(15, 15)]), &bbox()),
			FixedGeometry::Point(vec![FixedXy::new(15, 15)])
		);
		// points on the box boundary do not count as inside
		assert_eq!(
			clip(&FixedGeometry::Point(vec![FixedXy::new(10, 10)]), &bbox()),
			FixedGeometry::Null
		);
		assert_eq!(
			clip(&FixedGeometry::Point(vec![FixedXy::new(20, 12)]), &bbox()),
			FixedGeometry::Null
		);
	}

	#[test]
	fn polyline_outside() {
		let input = FixedGeometry::Polyline(vec![vec![FixedXy::new(0, 0), FixedXy::new(0, 30)]]);
		assert_eq!(clip(&input, &bbox()), FixedGeometry::Null);
	}

	#[test]
	fn polyline_inside_unchanged() {
		let input = FixedGeometry::Polyline(vec![vec![FixedXy::new(12, 12), FixedXy::new(18, 18)]]);
		assert_eq!(clip(&input, &bbox()), input);
	}

	#[test]
	fn polyline_cut_at_boundary() {
		let input = FixedGeometry::Polyline(vec![vec![FixedXy::new(12, 8), FixedXy::new(12, 12)]]);
		let expected =
			FixedGeometry::Polyline(vec![vec![FixedXy::new(12, 10), FixedXy::new(12, 12)]]);
		assert_eq!(clip(&input, &bbox()), expected);
	}

	#[test]
	fn polyline_crossing_splits() {
		// enters, leaves, re-enters: two parts
		let input = FixedGeometry::Polyline(vec![vec![
			FixedXy::new(15, 5),
			FixedXy::new(15, 15),
			FixedXy::new(25, 15),
			FixedXy::new(25, 18),
			FixedXy::new(18, 18),
		]]);
		match clip(&input, &bbox()) {
			FixedGeometry::Polyline(parts) => {
				assert_eq!(parts.len(), 2);
				assert_eq!(parts[0], vec![FixedXy::new(15, 10), FixedXy::new(15, 15), FixedXy::new(20, 15)]);
				assert_eq!(parts[1], vec![FixedXy::new(20, 18), FixedXy::new(18, 18)]);
			}
			other => panic!("expected polyline, got {other:?}"),
		}
	}

	#[test]
	fn polygon_clipped_to_window() {
		let input = FixedGeometry::Polygon(vec![SimplePolygon {
			outer: vec![
				FixedXy::new(0, 0),
				FixedXy::new(100, 0),
				FixedXy::new(100, 100),
				FixedXy::new(0, 100),
				FixedXy::new(0, 0),
			],
			inners: vec![],
		}]);
		match clip(&input, &bbox()) {
			FixedGeometry::Polygon(polygons) => {
				assert_eq!(polygons.len(), 1);
				let outer = &polygons[0].outer;
				assert_eq!(outer.first(), outer.last());
				assert_eq!(outer.len(), 5);
				for p in outer {
					assert!(p.x == 10 || p.x == 20);
					assert!(p.y == 10 || p.y == 20);
				}
			}
			other => panic!("expected polygon, got {other:?}"),
		}
	}

	#[test]
	fn union_of_touching_squares() {
		let square = |min: i64, max: i64| SimplePolygon {
			outer: vec![
				FixedXy::new(min, 0),
				FixedXy::new(max, 0),
				FixedXy::new(max, 10),
				FixedXy::new(min, 10),
				FixedXy::new(min, 0),
			],
			inners: vec![],
		};

		let merged = union_polygons(&vec![square(0, 10)], &vec![square(10, 20)]);
		assert_eq!(merged.len(), 1);
		assert_eq!(
			crate::fixed::area(&FixedGeometry::Polygon(merged)),
			200
		);

		let disjoint = union_polygons(&vec![square(0, 10)], &vec![square(30, 40)]);
		assert_eq!(disjoint.len(), 2);
	}

	#[test]
	fn polygon_outside_is_null() {
		let input = FixedGeometry::Polygon(vec![SimplePolygon {
			outer: vec![
				FixedXy::new(30, 30),
				FixedXy::new(40, 30),
				FixedXy::new(40, 40),
				FixedXy::new(30, 40),
				FixedXy::new(30, 30),
			],
			inners: vec![],
		}]);
		assert_eq!(clip(&input, &bbox()), FixedGeometry::Null);
	}
}
