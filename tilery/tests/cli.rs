use assert_cmd::Command;
use predicates::prelude::*;
use tilery_core::Tile;
use tilery_geometry::fixed::{FixedGeometry, FixedXy};
use tilery_storage::db::{
	feature_tile, open_tile_database, pack_features_quick, tile_to_key, LayerNamesBuilder,
	TABLE_FEATURES,
};
use tilery_storage::feature::{serialize_feature, Feature};

fn tilery() -> Command {
	Command::cargo_bin("tilery").unwrap()
}

#[test]
fn help() {
	tilery()
		.arg("--help")
		.assert()
		.success()
		.stdout(predicate::str::contains("Usage: tilery"))
		.stdout(predicate::str::contains("import"))
		.stdout(predicate::str::contains("serve"));
}

#[test]
fn version() {
	tilery()
		.arg("--version")
		.assert()
		.success()
		.stdout(predicate::str::starts_with("tilery "));
}

#[test]
fn no_subcommand_fails() {
	tilery().assert().failure();
}

#[test]
fn import_rejects_unknown_tasks() {
	let dir = tempfile::tempdir().unwrap();
	tilery()
		.args(["import", "--db"])
		.arg(dir.path().join("tiles.db"))
		.args(["--tasks", "frobnicate"])
		.assert()
		.code(1)
		.stderr(predicate::str::contains("unknown task"));
}

#[test]
fn import_features_without_source_fails() {
	let dir = tempfile::tempdir().unwrap();
	tilery()
		.args(["import", "--db"])
		.arg(dir.path().join("tiles.db"))
		.args(["--tasks", "features"])
		.assert()
		.code(1)
		.stderr(predicate::str::contains("--osm"));
}

#[test]
fn import_stats_runs_on_fresh_database() {
	let dir = tempfile::tempdir().unwrap();
	tilery()
		.args(["import", "--db"])
		.arg(dir.path().join("tiles.db"))
		.args(["--tasks", "stats"])
		.assert()
		.success();
}

/// Seeds a database through the library, then runs pack, tiles and
/// benchmark through the binary.
#[test]
fn pack_prepare_and_benchmark_roundtrip() {
	let dir = tempfile::tempdir().unwrap();
	let db_path = dir.path().join("tiles.db");

	{
		let db = open_tile_database(&db_path).unwrap();
		let names = LayerNamesBuilder::new();
		names.layer_id("poi");
		names.store(&db).unwrap();

		let feature = Feature {
			id: 1,
			layer: 0,
			zoom_levels: (0, 20),
			meta: vec![],
			geometry: FixedGeometry::Point(vec![FixedXy::new((1 << 30) + 77, (1 << 30) + 77)]),
		};
		let tile = feature_tile(feature.geometry.bounding_box().as_ref().unwrap(), 10);
		let mut inserter = db.inserter(TABLE_FEATURES).unwrap();
		inserter
			.insert(
				tile_to_key(&tile, 0),
				&pack_features_quick(&[serialize_feature(&feature, None).unwrap()]),
			)
			.unwrap();
		inserter.commit().unwrap();
	}

	tilery()
		.args(["import", "--db"])
		.arg(&db_path)
		.args(["--tasks", "pack", "tiles"])
		.assert()
		.success();

	// the tile containing the point renders without errors
	let probe = Tile::new((1 << 30) >> (32 - 12), (1 << 30) >> (32 - 12), 12);
	tilery()
		.args(["benchmark", "--db"])
		.arg(&db_path)
		.args([
			"--tile",
			&probe.x.to_string(),
			&probe.y.to_string(),
			"12",
			"--compress",
			"false",
		])
		.assert()
		.success();
}
