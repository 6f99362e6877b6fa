mod get_tile;
mod perf_counter;

pub use get_tile::get_tile;
pub use perf_counter::PerfCounter;

use crate::db::{
	load_layer_names, BqTree, MetaCoding, TileDatabase, META_KEY_FULLY_SEASIDE_TREE,
	META_KEY_MAX_PREPARED_ZOOM,
};
use anyhow::{Context, Result};
use tilery_core::io::ValueReader;
use tilery_core::{compress_deflate, Blob, Tile};
use tilery_geometry::fixed::{FixedGeometry, FixedXy, SimplePolygon, MAP_SIZE};
use tilery_geometry::mvt::{MvtLayer, MvtTile};
use tilery_geometry::TileSpec;

/// Immutable state shared by all tile renders: the persisted dictionaries,
/// the fully-seaside tree and the render toggles.
pub struct RenderCtx {
	pub layer_names: Vec<String>,
	pub meta_coding: MetaCoding,
	pub seaside_tree: BqTree,
	pub max_prepared_zoom: Option<u32>,
	pub ignore_prepared: bool,
	pub compress_result: bool,
	pub aggregate_lines: bool,
	pub aggregate_polygons: bool,
	pub drop_subpixel_polygons: bool,
	water_tile: Blob,
	water_tile_deflated: Blob,
}

/// Loads the render context from the database.
pub fn make_render_ctx(db: &TileDatabase) -> Result<RenderCtx> {
	let seaside_tree = match db.get_meta(META_KEY_FULLY_SEASIDE_TREE)? {
		Some(blob) => BqTree::from_blob(&blob).context("corrupt fully-seaside tree")?,
		None => BqTree::new_empty(),
	};

	let max_prepared_zoom = match db.get_meta(META_KEY_MAX_PREPARED_ZOOM)? {
		Some(blob) => Some(ValueReader::new(blob.as_slice()).read_varint()? as u32),
		None => None,
	};

	let water_tile = render_water_tile()?;
	let water_tile_deflated = compress_deflate(&water_tile)?;

	Ok(RenderCtx {
		layer_names: load_layer_names(db)?,
		meta_coding: MetaCoding::load(db)?,
		seaside_tree,
		max_prepared_zoom,
		ignore_prepared: false,
		compress_result: true,
		aggregate_lines: true,
		aggregate_polygons: true,
		drop_subpixel_polygons: true,
		water_tile,
		water_tile_deflated,
	})
}

impl RenderCtx {
	pub fn layer_name(&self, layer: u32) -> &str {
		self.layer_names
			.get(layer as usize)
			.map_or("unnamed", |name| name.as_str())
	}

	/// The cached all-water tile for fully seaside tiles.
	pub fn water_tile(&self) -> &Blob {
		if self.compress_result {
			&self.water_tile_deflated
		} else {
			&self.water_tile
		}
	}
}

/// Renders the tile emitted for fully seaside tiles once: a single square
/// covering the whole extent in a `water` layer. The geometry is the same
/// for every tile, so the root tile spec stands in for all of them.
fn render_water_tile() -> Result<Blob> {
	let spec = TileSpec::new(Tile::new(0, 0, 0))?;
	let square = FixedGeometry::Polygon(vec![SimplePolygon {
		outer: vec![
			FixedXy::new(0, 0),
			FixedXy::new(MAP_SIZE, 0),
			FixedXy::new(MAP_SIZE, MAP_SIZE),
			FixedXy::new(0, MAP_SIZE),
			FixedXy::new(0, 0),
		],
		inners: vec![],
	}]);

	let mut layer = MvtLayer::new("water");
	layer.add_feature(1, &spec, &square, &[])?;
	let mut tile = MvtTile::new();
	tile.add_layer(layer);
	Ok(tile.to_blob())
}
