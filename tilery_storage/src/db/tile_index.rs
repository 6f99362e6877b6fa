use tilery_core::Tile;

/// A packed tile key: 5 bits zoom, the Morton-interleaved tile address and a
/// 17 bit overflow counter.
///
/// ```text
/// bit 63      58                17                0
///     | z (5) | morton(x, y, z) | counter n (17) |
/// ```
///
/// Sorting keys numerically puts every zoom level in one contiguous block,
/// ancestors (lower zoom) before descendants, and makes the descendants of
/// any tile at any deeper zoom a single contiguous range.
pub type TileKey = u64;

const ZOOM_SHIFT: u32 = 58;
const COUNTER_BITS: u32 = 17;

/// Largest overflow counter: `2^17 - 1`.
pub const MAX_KEY_COUNTER: u32 = (1 << COUNTER_BITS) - 1;

pub fn tile_to_key(tile: &Tile, n: u32) -> TileKey {
	debug_assert!(tile.z <= 20 && tile.is_valid());
	debug_assert!(n <= MAX_KEY_COUNTER);

	(u64::from(tile.z) << ZOOM_SHIFT)
		| (morton_interleave(tile.x, tile.y, tile.z) << COUNTER_BITS)
		| u64::from(n)
}

pub fn key_to_tile(key: TileKey) -> Tile {
	let z = (key >> ZOOM_SHIFT) as u32;
	let morton = (key >> COUNTER_BITS) & ((1u64 << (2 * z)) - 1);

	let mut x = 0u32;
	let mut y = 0u32;
	for i in 0..z {
		x |= (((morton >> (2 * i)) & 1) as u32) << i;
		y |= (((morton >> (2 * i + 1)) & 1) as u32) << i;
	}
	Tile::new(x, y, z)
}

pub fn key_to_n(key: TileKey) -> u32 {
	(key & u64::from(MAX_KEY_COUNTER)) as u32
}

/// The key range covering the subtree of `tile` at zoom `z >= tile.z`,
/// including every overflow counter. Both bounds are inclusive.
pub fn subtree_range_at_zoom(tile: &Tile, z: u32) -> (TileKey, TileKey) {
	debug_assert!(z >= tile.z && z <= 20);
	let spread = 2 * (z - tile.z);
	let morton = morton_interleave(tile.x, tile.y, tile.z);

	let lo = (u64::from(z) << ZOOM_SHIFT) | ((morton << spread) << COUNTER_BITS);
	let hi = (u64::from(z) << ZOOM_SHIFT)
		| ((((morton + 1) << spread) << COUNTER_BITS) - 1);
	(lo, hi)
}

/// The deepest tile (capped at `max_zoom`) whose bounds contain the whole
/// box. Features are keyed under this tile during ingest and repacking.
pub fn feature_tile(bbox: &tilery_geometry::fixed::FixedBox, max_zoom: u32) -> Tile {
	let clamp = |v: i64| v.clamp(0, (1i64 << 32) - 1) as u64;
	let (min_x, min_y) = (clamp(bbox.min.x), clamp(bbox.min.y));
	let (max_x, max_y) = (clamp(bbox.max.x), clamp(bbox.max.y));

	let spread = (min_x ^ max_x) | (min_y ^ max_y);
	let z = spread.leading_zeros().saturating_sub(32).min(max_zoom);
	Tile::new((min_x >> (32 - z)) as u32, (min_y >> (32 - z)) as u32, z)
}

fn morton_interleave(x: u32, y: u32, z: u32) -> u64 {
	let mut morton = 0u64;
	for i in 0..z {
		morton |= u64::from((x >> i) & 1) << (2 * i);
		morton |= u64::from((y >> i) & 1) << (2 * i + 1);
	}
	morton
}
