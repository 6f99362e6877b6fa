use anyhow::{ensure, Result};
use std::path::PathBuf;
use tilery_core::Tile;
use tilery_geometry::fixed::latlng_to_fixed;
use tilery_storage::db::open_tile_database;
use tilery_storage::render::{get_tile, make_render_ctx, PerfCounter};

#[derive(clap::Args, Debug)]
pub struct Subcommand {
	/// Path of the tile database; the pack file lives beside it.
	#[arg(long = "db")]
	pub db_fname: PathBuf,

	/// x y z of a single tile, or a bare z for a whole zoom level; renders
	/// a fixed sample region when absent.
	#[arg(long, num_args = 0..=3)]
	pub tile: Vec<u32>,

	/// Deflate the rendered tiles.
	#[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
	pub compress: bool,
}

pub fn run(arguments: &Subcommand) -> Result<()> {
	let db = open_tile_database(&arguments.db_fname)?;
	let pack = super::open_pack(&arguments.db_fname)?;

	let mut ctx = make_render_ctx(&db)?;
	ctx.ignore_prepared = true;
	ctx.compress_result = arguments.compress;

	match arguments.tile.as_slice() {
		[] => {
			// a fixed sample region around the Rhine-Main area
			let nw = latlng_to_fixed(50.13, 8.55);
			let se = latlng_to_fixed(49.83, 8.74);

			for z in (9..18u32).step_by(2) {
				let range = |a: i64, b: i64| ((a >> (32 - z)) as u32)..=((b >> (32 - z)) as u32);
				let mut pc = PerfCounter::new();
				let mut tiles = 0;
				for x in range(nw.x, se.x) {
					for y in range(nw.y, se.y) {
						get_tile(&db, &pack, &ctx, Tile::new(x, y, z), &mut pc)?;
						tiles += 1;
					}
				}
				log::info!("=== zoom {z} ({tiles} tiles)");
				pc.report();
			}
		}
		[z] => {
			ensure!(*z <= 20, "zoom level out of range");
			log::info!("render entire zoom level {z}");
			let mut pc = PerfCounter::new();
			for x in 0..(1u32 << z) {
				for y in 0..(1u32 << z) {
					get_tile(&db, &pack, &ctx, Tile::new(x, y, *z), &mut pc)?;
				}
			}
			pc.report();
		}
		[x, y, z] => {
			let tile = Tile::new(*x, *y, *z);
			ensure!(tile.is_valid() && *z <= 20, "invalid tile {tile:?}");
			log::info!("render tile {tile}");

			let mut pc = PerfCounter::new();
			let rendered = get_tile(&db, &pack, &ctx, tile, &mut pc)?;
			match rendered {
				Some(blob) => log::info!("rendered {} bytes", blob.len()),
				None => log::info!("tile is empty"),
			}
			pc.report();
		}
		_ => anyhow::bail!("--tile takes either 'x y z' or a single 'z'"),
	}
	Ok(())
}
