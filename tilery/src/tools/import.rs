use anyhow::{ensure, Result};
use std::path::PathBuf;
use tilery_core::ScopedTimer;
use tilery_osm::{load_coastlines, load_osm, DefaultProfile, FeatureInserter};
use tilery_storage::db::{
	clear_database, database_stats, open_tile_database, pack_database, prepare_tiles,
	LayerNamesBuilder, SharedMetadataBuilder,
};

const KNOWN_TASKS: [&str; 6] = ["all", "coastlines", "features", "stats", "pack", "tiles"];

/// Zoom levels up to this limit are pre-rendered by the `tiles` task.
const PREPARED_ZOOM: u32 = 10;

#[derive(clap::Args, Debug)]
pub struct Subcommand {
	/// Path of the tile database; the pack file lives beside it.
	#[arg(long = "db")]
	pub db_fname: PathBuf,

	/// OSM extract (PBF) to import.
	#[arg(long = "osm")]
	pub osm_fname: Option<PathBuf>,

	/// Zipped coastline shapefile (land polygons).
	#[arg(long = "coastlines")]
	pub coastlines_fname: Option<PathBuf>,

	/// 'all' or any combination of: 'coastlines', 'features', 'stats',
	/// 'pack', 'tiles'.
	#[arg(long = "tasks", num_args = 1.., default_values = ["all"])]
	pub tasks: Vec<String>,

	/// Scratch directory for the node index files.
	#[arg(long, default_value = ".")]
	pub tmp_dname: PathBuf,
}

impl Subcommand {
	fn has_any_task(&self, query: &[&str]) -> bool {
		self.tasks.iter().any(|task| task == "all")
			|| query.iter().any(|q| self.tasks.iter().any(|task| task == q))
	}
}

pub fn run(arguments: &Subcommand) -> Result<()> {
	for task in &arguments.tasks {
		ensure!(
			KNOWN_TASKS.contains(&task.as_str()),
			"unknown task {task:?}, expected one of {KNOWN_TASKS:?}"
		);
	}

	let db = open_tile_database(&arguments.db_fname)?;
	if arguments.has_any_task(&["coastlines", "features"]) {
		log::info!("clearing database");
		clear_database(&db)?;
	}

	let inserter = FeatureInserter::new(&db);
	let layer_names = LayerNamesBuilder::from_database(&db)?;

	if arguments.has_any_task(&["coastlines"]) {
		let coastlines = arguments
			.coastlines_fname
			.as_ref()
			.ok_or_else(|| anyhow::anyhow!("the coastlines task needs --coastlines"))?;
		load_coastlines(&db, &inserter, &layer_names, coastlines)?;
		inserter.flush()?;
		layer_names.store(&db)?;
	}

	if arguments.has_any_task(&["features"]) {
		let osm = arguments
			.osm_fname
			.as_ref()
			.ok_or_else(|| anyhow::anyhow!("the features task needs --osm"))?;
		let _timer = ScopedTimer::new("load features");
		let profile = DefaultProfile::new();
		let shared_metadata = SharedMetadataBuilder::new(8);
		load_osm(
			&db,
			&inserter,
			&profile,
			&layer_names,
			&shared_metadata,
			osm,
			&arguments.tmp_dname,
		)?;
	}

	if arguments.has_any_task(&["stats"]) {
		database_stats(&db)?;
	}

	if arguments.has_any_task(&["pack"]) {
		let _timer = ScopedTimer::new("pack features");
		let mut pack = super::open_pack(&arguments.db_fname)?;
		pack_database(&db, &mut pack)?;
	}

	if arguments.has_any_task(&["tiles"]) {
		let _timer = ScopedTimer::new("prepare tiles");
		let pack = super::open_pack(&arguments.db_fname)?;
		prepare_tiles(&db, &pack, PREPARED_ZOOM)?;
	}

	log::info!("import done");
	Ok(())
}
