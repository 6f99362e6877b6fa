mod bq_tree;
mod database;
mod feature_pack;
mod layer_names;
mod pack_file;
mod pack_task;
mod prepare_tiles;
mod quad_tree;
mod shared_metadata;
mod stats;
mod tile_index;

pub use bq_tree::{make_bq_tree, BqTree};
pub use database::{
	clear_database, open_tile_database, BatchInserter, TileDatabase, META_KEY_FEATURE_META_CODING,
	META_KEY_FULLY_SEASIDE_TREE, META_KEY_LAYER_NAMES, META_KEY_MAX_PREPARED_ZOOM, TABLE_FEATURES,
	TABLE_META, TABLE_TILES,
};
pub use feature_pack::{
	feature_pack_valid, pack_features_optimal, pack_features_quick, unpack_features,
	unpack_features_overlapping, FeaturePack, PackSegment,
};
pub use layer_names::{load_layer_names, read_layer_names, write_layer_names, LayerNamesBuilder};
pub use pack_file::{
	pack_records_deserialize, pack_records_foreach, pack_records_serialize, pack_records_update,
	PackHandle, PackRecord,
};
pub use pack_task::pack_database;
pub use prepare_tiles::prepare_tiles;
pub use quad_tree::{make_quad_tree, walk_quad_tree, QuadTreeInput};
pub use shared_metadata::{MetaCoding, SharedMetadataBuilder};
pub use stats::database_stats;
pub use tile_index::{
	feature_tile, key_to_n, key_to_tile, subtree_range_at_zoom, tile_to_key, TileKey,
	MAX_KEY_COUNTER,
};
