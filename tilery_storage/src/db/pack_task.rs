use super::database::{TileDatabase, TABLE_FEATURES};
use super::feature_pack::{pack_features_optimal, pack_features_quick, FeaturePack};
use super::pack_file::{PackHandle, PackRecord};
use super::shared_metadata::MetaCoding;
use super::tile_index::{feature_tile, key_to_n, key_to_tile, tile_to_key};
use crate::feature::{parse_feature, serialize_feature};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tilery_core::Tile;
use tilery_geometry::fixed::MAX_ZOOM;

/// Repacks every quick pack written during ingest into one optimal pack per
/// root tile: features are re-serialized with the frozen metadata coding,
/// grouped by their deepest containing tile, written contiguously into the
/// pack file and indexed by an embedded quad tree. Overflow entries of a
/// root tile collapse into the single key with counter zero.
pub fn pack_database(db: &TileDatabase, pack: &mut PackHandle) -> Result<()> {
	let coding = MetaCoding::load(db)?;

	let mut roots: BTreeMap<Tile, Vec<u64>> = BTreeMap::new();
	for key in db.keys(TABLE_FEATURES)? {
		roots.entry(key_to_tile(key)).or_default().push(key);
	}

	for (root, keys) in roots {
		let mut by_leaf: BTreeMap<Tile, Vec<Vec<u8>>> = BTreeMap::new();

		for key in &keys {
			let value = db
				.get_value(TABLE_FEATURES, *key)?
				.context("feature key vanished during repack")?;

			let mut collect = |bytes: &[u8]| -> anyhow::Result<()> {
				let parsed = parse_feature(bytes)?;
				let mut leaf = feature_tile(&parsed.bbox, MAX_ZOOM);
				if !root.is_ancestor_of(&leaf) {
					leaf = root;
				}
				let recoded = serialize_feature(&parsed.into_feature(&coding)?, Some(&coding))?;
				by_leaf.entry(leaf).or_default().push(recoded);
				Ok(())
			};

			// quick packs and inline children carry their features
			// themselves; earlier repack runs left them in the pack file
			let parsed = FeaturePack::parse(&value)?;
			for record in parsed.pack_file_records() {
				let sub_pack = pack.read(&record)?;
				FeaturePack::parse(&sub_pack)?.for_each_feature(&mut collect)?;
			}
			parsed.for_each_feature(&mut collect)?;
		}

		let mut sub_packs = Vec::with_capacity(by_leaf.len());
		for (leaf, features) in &by_leaf {
			let record = pack.append(&pack_features_quick(features))?;
			sub_packs.push((*leaf, vec![record], features.len() as u32));
		}
		let optimal = pack_features_optimal(root, &sub_packs, &[])
			.with_context(|| format!("failed to repack {root:?}"))?;

		let key_count = keys.len();
		let mut inserter = db.inserter(TABLE_FEATURES)?;
		inserter.insert(tile_to_key(&root, 0), &optimal)?;
		inserter.commit()?;
		for key in keys {
			if key_to_n(key) != 0 {
				db.delete_value(TABLE_FEATURES, key)?;
			}
		}

		log::debug!(
			"repacked {root:?}: {} leaf tiles from {key_count} keys",
			by_leaf.len()
		);
	}
	Ok(())
}
