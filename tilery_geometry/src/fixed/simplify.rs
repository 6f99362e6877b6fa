use super::{FixedXy, MAX_ZOOM};
use anyhow::{ensure, Result};
use tilery_core::io::{ValueReader, ValueWriter};

/// Per-zoom vertex masks for one ring.
///
/// Layout: `varint vertex_count`, then `MAX_ZOOM + 1` packed bitsets of
/// `vertex_count` bits (LSB first), zoom 0 first. A set bit keeps the vertex
/// when the ring is materialized at that zoom.
pub struct SimplifyMaskReader<'a> {
	bits: &'a [u8],
	size: usize,
}

impl<'a> SimplifyMaskReader<'a> {
	pub fn new(data: &'a [u8], z: u32) -> Result<SimplifyMaskReader<'a>> {
		let z = z.min(MAX_ZOOM);
		let mut reader = ValueReader::new(data);
		let size = reader.read_varint()? as usize;
		let stride = size.div_ceil(8);
		let offset = reader.position() + stride * z as usize;
		ensure!(
			data.len() >= offset + stride,
			"simplify mask too short for {size} vertices"
		);
		Ok(SimplifyMaskReader {
			bits: &data[offset..offset + stride],
			size,
		})
	}

	pub fn size(&self) -> usize {
		self.size
	}

	pub fn get_bit(&self, i: usize) -> bool {
		self.bits[i / 8] & (1 << (i % 8)) != 0
	}
}

/// Builds the simplify mask of a ring with Douglas-Peucker, one pass per
/// zoom level. The tolerance at zoom `z` is one output pixel, `1 << (MAX_ZOOM - z)`
/// fixed units; the first and last vertex always survive.
pub fn make_simplify_mask(ring: &[FixedXy]) -> Vec<u8> {
	let mut writer = ValueWriter::new();
	writer.write_varint(ring.len() as u64);

	let stride = ring.len().div_ceil(8);
	for z in 0..=MAX_ZOOM {
		let mut bits = vec![0u8; stride];
		if ring.len() <= 2 {
			for (i, _) in ring.iter().enumerate() {
				bits[i / 8] |= 1 << (i % 8);
			}
		} else {
			let tolerance = (1i64 << (MAX_ZOOM - z)) as f64;
			bits[0] |= 1;
			let last = ring.len() - 1;
			bits[last / 8] |= 1 << (last % 8);
			douglas_peucker(ring, 0, last, tolerance * tolerance, &mut bits);
		}
		writer.write_slice(&bits);
	}

	writer.into_vec()
}

fn douglas_peucker(ring: &[FixedXy], first: usize, last: usize, sq_tolerance: f64, bits: &mut [u8]) {
	if last <= first + 1 {
		return;
	}

	let mut max_dist = 0.0f64;
	let mut max_index = first;
	for i in (first + 1)..last {
		let dist = sq_segment_distance(&ring[i], &ring[first], &ring[last]);
		if dist > max_dist {
			max_dist = dist;
			max_index = i;
		}
	}

	if max_dist > sq_tolerance {
		bits[max_index / 8] |= 1 << (max_index % 8);
		douglas_peucker(ring, first, max_index, sq_tolerance, bits);
		douglas_peucker(ring, max_index, last, sq_tolerance, bits);
	}
}

fn sq_segment_distance(p: &FixedXy, a: &FixedXy, b: &FixedXy) -> f64 {
	let (px, py) = (p.x as f64, p.y as f64);
	let (ax, ay) = (a.x as f64, a.y as f64);
	let (bx, by) = (b.x as f64, b.y as f64);

	let (dx, dy) = (bx - ax, by - ay);
	let (mut cx, mut cy) = (ax, ay);

	if dx != 0.0 || dy != 0.0 {
		let t = ((px - ax) * dx + (py - ay) * dy) / (dx * dx + dy * dy);
		if t > 1.0 {
			cx = bx;
			cy = by;
		} else if t > 0.0 {
			cx += dx * t;
			cy += dy * t;
		}
	}

	let (ex, ey) = (px - cx, py - cy);
	ex * ex + ey * ey
}

#[cfg(test)]
mod tests {
	use super::*;

	fn kept(mask: &[u8], z: u32, n: usize) -> Vec<usize> {
		let reader = SimplifyMaskReader::new(mask, z).unwrap();
		assert_eq!(reader.size(), n);
		(0..n).filter(|i| reader.get_bit(*i)).collect()
	}

	#[test]
	fn endpoints_always_survive() {
		let ring = vec![
			FixedXy::new(0, 0),
			FixedXy::new(1 << 10, 5),
			FixedXy::new(1 << 20, 0),
		];
		let mask = make_simplify_mask(&ring);
		for z in 0..=MAX_ZOOM {
			let indices = kept(&mask, z, 3);
			assert!(indices.contains(&0));
			assert!(indices.contains(&2));
		}
	}

	#[test]
	fn deep_zoom_keeps_detail() {
		// a detour of 2^14 fixed units: invisible at z0, kept from z7 on
		// (tolerance at z7 is 2^13)
		let ring = vec![
			FixedXy::new(0, 0),
			FixedXy::new(1 << 16, 1 << 14),
			FixedXy::new(1 << 17, 0),
		];
		let mask = make_simplify_mask(&ring);
		assert_eq!(kept(&mask, 0, 3), vec![0, 2]);
		assert_eq!(kept(&mask, 7, 3), vec![0, 1, 2]);
		assert_eq!(kept(&mask, MAX_ZOOM, 3), vec![0, 1, 2]);
	}

	#[test]
	fn short_rings_stay_complete() {
		let ring = vec![FixedXy::new(3, 4), FixedXy::new(5, 6)];
		let mask = make_simplify_mask(&ring);
		assert_eq!(kept(&mask, 0, 2), vec![0, 1]);
	}

	#[test]
	fn mask_too_short_fails() {
		assert!(SimplifyMaskReader::new(&[42], 0).is_err());
	}
}
