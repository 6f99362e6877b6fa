use super::{FixedCoord, FixedGeometry, FixedXy};

/// The area of a geometry in fixed units squared: the shoelace sum over all
/// polygon rings, outers counted positive and inners negative. Points and
/// polylines have no area.
pub fn area(geometry: &FixedGeometry) -> FixedCoord {
	match geometry {
		FixedGeometry::Polygon(polygons) => {
			let mut sum: i128 = 0;
			for polygon in polygons {
				sum += ring_area(&polygon.outer).abs();
				for inner in &polygon.inners {
					sum -= ring_area(inner).abs();
				}
			}
			sum.clamp(i128::from(FixedCoord::MIN), i128::from(FixedCoord::MAX)) as FixedCoord
		}
		_ => 0,
	}
}

/// Twice-signed shoelace sum halved; positive for counter-clockwise rings in
/// a y-up plane (the fixed plane is y-down, so screen-clockwise is positive).
fn ring_area(ring: &[FixedXy]) -> i128 {
	let mut doubled: i128 = 0;
	for window in ring.windows(2) {
		let (a, b) = (window[0], window[1]);
		doubled += i128::from(a.x) * i128::from(b.y) - i128::from(b.x) * i128::from(a.y);
	}
	doubled / 2
}
