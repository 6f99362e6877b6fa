use super::database::{TileDatabase, TABLE_FEATURES, TABLE_META, TABLE_TILES};
use super::feature_pack::FeaturePack;
use super::tile_index::key_to_tile;
use anyhow::Result;
use std::collections::BTreeMap;

/// Logs table sizes and the per-zoom distribution of feature entries.
pub fn database_stats(db: &TileDatabase) -> Result<()> {
	for table in [TABLE_META, TABLE_FEATURES, TABLE_TILES] {
		let (count, bytes) = db.table_stats(table)?;
		log::info!("{table:>10}: {count:>9} entries, {bytes:>12} bytes");
	}

	let mut per_zoom: BTreeMap<u32, (u64, u64)> = BTreeMap::new();
	for key in db.keys(TABLE_FEATURES)? {
		let value = db.get_value(TABLE_FEATURES, key)?.unwrap_or_default();
		let features = FeaturePack::parse(&value)
			.map(|pack| u64::from(pack.feature_count))
			.unwrap_or(0);
		let entry = per_zoom.entry(key_to_tile(key).z).or_insert((0, 0));
		entry.0 += 1;
		entry.1 += features;
	}
	for (zoom, (entries, features)) in per_zoom {
		log::info!("  zoom {zoom:>2}: {entries:>8} packs, {features:>10} features");
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::super::database::open_tile_database;
	use super::super::feature_pack::pack_features_quick;
	use super::super::tile_index::tile_to_key;
	use super::*;
	use tilery_core::Tile;

	#[test]
	fn runs_on_populated_database() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let db = open_tile_database(&dir.path().join("t.db"))?;

		let mut inserter = db.inserter(TABLE_FEATURES)?;
		inserter.insert(
			tile_to_key(&Tile::new(1, 2, 3), 0),
			&pack_features_quick(&[vec![1, 2, 3]]),
		)?;
		inserter.commit()?;

		database_stats(&db)?;
		Ok(())
	}
}
