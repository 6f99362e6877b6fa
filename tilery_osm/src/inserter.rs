use anyhow::{ensure, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use tilery_core::Tile;
use tilery_storage::db::{
	feature_tile, pack_features_quick, tile_to_key, TileDatabase, MAX_KEY_COUNTER, TABLE_FEATURES,
};
use tilery_storage::feature::{serialize_feature, Feature};

/// Root tiles never go deeper than this; the repack task later fans the
/// features out to finer tiles.
pub const FEATURE_INSERT_ZOOM: u32 = 10;

const FLUSH_THRESHOLD: usize = 16 * 1024 * 1024;

/// Collects serialized features per root tile and writes them to the
/// `features` table as quick packs. Shared by all import workers; the
/// critical section is one mutex around the buffer state, flushing happens
/// inside it so packs and overflow counters stay consistent.
pub struct FeatureInserter<'a> {
	db: &'a TileDatabase,
	state: Mutex<InserterState>,
}

#[derive(Default)]
struct InserterState {
	buffers: HashMap<Tile, Vec<Vec<u8>>>,
	buffered_bytes: usize,
	counters: HashMap<Tile, u32>,
	feature_count: u64,
}

impl<'a> FeatureInserter<'a> {
	pub fn new(db: &'a TileDatabase) -> FeatureInserter<'a> {
		FeatureInserter {
			db,
			state: Mutex::new(InserterState::default()),
		}
	}

	pub fn insert(&self, feature: &Feature) -> Result<()> {
		let bbox = feature
			.geometry
			.bounding_box()
			.ok_or_else(|| anyhow::anyhow!("cannot insert feature without geometry"))?;
		let tile = feature_tile(&bbox, FEATURE_INSERT_ZOOM);
		let serialized = serialize_feature(feature, None)?;

		let mut state = self.state.lock().unwrap();
		state.buffered_bytes += serialized.len();
		state.buffers.entry(tile).or_default().push(serialized);
		state.feature_count += 1;
		if state.buffered_bytes >= FLUSH_THRESHOLD {
			self.flush_locked(&mut state)?;
		}
		Ok(())
	}

	/// Writes out all buffered packs.
	pub fn flush(&self) -> Result<()> {
		let mut state = self.state.lock().unwrap();
		self.flush_locked(&mut state)
	}

	pub fn feature_count(&self) -> u64 {
		self.state.lock().unwrap().feature_count
	}

	fn flush_locked(&self, state: &mut InserterState) -> Result<()> {
		if state.buffers.is_empty() {
			return Ok(());
		}

		let buffers = std::mem::take(&mut state.buffers);
		state.buffered_bytes = 0;

		let mut inserter = self.db.inserter(TABLE_FEATURES)?;
		for (tile, features) in buffers {
			let n = state.counters.entry(tile).or_insert(0);
			ensure!(*n <= MAX_KEY_COUNTER, "tile {tile:?} overflowed its key counter");
			inserter.insert(tile_to_key(&tile, *n), &pack_features_quick(&features))?;
			*n += 1;
		}
		inserter.commit()
	}
}
