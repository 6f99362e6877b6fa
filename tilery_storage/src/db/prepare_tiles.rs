use super::database::{TileDatabase, META_KEY_MAX_PREPARED_ZOOM, TABLE_TILES};
use super::pack_file::PackHandle;
use super::tile_index::tile_to_key;
use crate::render::{get_tile, make_render_ctx, PerfCounter, RenderCtx};
use anyhow::Result;
use tilery_core::io::ValueWriter;
use tilery_core::Tile;

/// Renders every populated tile up to `max_zoom` and stores the deflated
/// result in the `tiles` table, then records the prepared zoom limit.
///
/// Walks the tile pyramid top-down and prunes subtrees without any feature
/// entries; fully seaside tiles are skipped, the render path answers those
/// from the seaside tree directly.
pub fn prepare_tiles(db: &TileDatabase, pack: &PackHandle, max_zoom: u32) -> Result<()> {
	let mut ctx = make_render_ctx(db)?;
	ctx.ignore_prepared = true;
	ctx.compress_result = true;

	let mut pc = PerfCounter::new();
	let mut prepared = 0u64;
	prepare_subtree(
		db,
		pack,
		&ctx,
		Tile::new(0, 0, 0),
		max_zoom,
		false,
		&mut pc,
		&mut prepared,
	)?;

	let mut writer = ValueWriter::new();
	writer.write_varint(u64::from(max_zoom));
	db.put_meta(META_KEY_MAX_PREPARED_ZOOM, &writer.into_blob())?;

	log::info!("prepared {prepared} tiles up to zoom {max_zoom}");
	pc.report();
	Ok(())
}

#[allow(clippy::too_many_arguments)]
fn prepare_subtree(
	db: &TileDatabase,
	pack: &PackHandle,
	ctx: &RenderCtx,
	tile: Tile,
	max_zoom: u32,
	ancestors_populated: bool,
	pc: &mut PerfCounter,
	prepared: &mut u64,
) -> Result<()> {
	if !ancestors_populated && !db.has_features_in_subtree(&tile)? {
		return Ok(());
	}

	if !ctx.seaside_tree.contains(&tile) {
		if let Some(rendered) = get_tile(db, pack, ctx, tile, pc)? {
			let mut inserter = db.inserter(TABLE_TILES)?;
			inserter.insert(tile_to_key(&tile, 0), rendered.as_slice())?;
			inserter.commit()?;
			*prepared += 1;
		}
	}

	if tile.z < max_zoom {
		let populated = ancestors_populated || db.has_features_at(&tile)?;
		for child in tile.children() {
			prepare_subtree(db, pack, ctx, child, max_zoom, populated, pc, prepared)?;
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::super::database::{open_tile_database, TABLE_FEATURES};
	use super::super::feature_pack::pack_features_quick;
	use super::super::layer_names::LayerNamesBuilder;
	use super::super::tile_index::feature_tile;
	use super::*;
	use crate::feature::{serialize_feature, Feature};
	use tilery_geometry::fixed::{FixedGeometry, FixedXy};

	#[test]
	fn prepares_populated_tiles_and_records_the_limit() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let db = open_tile_database(&dir.path().join("t.db"))?;
		let pack = PackHandle::open(&dir.path().join("t.pack"))?;

		let names = LayerNamesBuilder::new();
		names.layer_id("poi");
		names.store(&db)?;

		let feature = Feature {
			id: 1,
			layer: 0,
			zoom_levels: (0, 20),
			meta: vec![],
			geometry: FixedGeometry::Point(vec![FixedXy::new((1 << 30) + 65, (1 << 30) + 65)]),
		};
		let tile = feature_tile(feature.geometry.bounding_box().as_ref().unwrap(), 10);
		let mut inserter = db.inserter(TABLE_FEATURES)?;
		inserter.insert(
			tile_to_key(&tile, 0),
			&pack_features_quick(&[serialize_feature(&feature, None)?]),
		)?;
		inserter.commit()?;

		prepare_tiles(&db, &pack, 4)?;

		// one prepared tile per zoom level on the path to the feature
		let (count, _) = db.table_stats(TABLE_TILES)?;
		assert_eq!(count, 5);

		let ctx = make_render_ctx(&db)?;
		assert_eq!(ctx.max_prepared_zoom, Some(4));

		// the prepared tile is served from the tiles table
		let mut pc = PerfCounter::new();
		let expected_tile = Tile::new(1 << 2, 1 << 2, 4);
		let served = get_tile(&db, &pack, &ctx, expected_tile, &mut pc)?;
		assert!(served.is_some());

		// unpopulated prepared tiles answer empty
		let empty = get_tile(&db, &pack, &ctx, Tile::new(0, 0, 4), &mut pc)?;
		assert!(empty.is_none());
		Ok(())
	}
}
