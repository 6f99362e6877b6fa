use crate::server::{run_server, ServerState};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tilery_storage::db::open_tile_database;
use tilery_storage::render::make_render_ctx;

#[derive(clap::Args, Debug)]
pub struct Subcommand {
	/// Path of the tile database; the pack file lives beside it.
	#[arg(long = "db")]
	pub db_fname: PathBuf,

	/// Directory with static resources (map style, glyphs, frontend).
	#[arg(long = "res")]
	pub res_dname: Option<PathBuf>,

	/// Listening port.
	#[arg(short, long, default_value_t = 8080)]
	pub port: u16,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand) -> Result<()> {
	let db = open_tile_database(&arguments.db_fname)?;
	let pack = super::open_pack(&arguments.db_fname)?;
	let ctx = make_render_ctx(&db)?;

	let state = Arc::new(ServerState {
		db,
		pack,
		ctx,
		res_dir: arguments.res_dname.clone(),
	});

	run_server(state, arguments.port).await
}
