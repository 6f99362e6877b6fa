mod server;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};

#[derive(Parser, Debug)]
#[command(
	author,
	version,
	about = "Imports OpenStreetMap data and serves Mapbox vector tiles.",
	long_about = None,
	propagate_version = true,
	disable_help_subcommand = true,
)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	#[command(flatten)]
	verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Import OSM extracts and coastlines into a tile database
	Import(tools::import::Subcommand),

	/// Render tiles repeatedly for micro-benchmarking
	Benchmark(tools::benchmark::Subcommand),

	/// Serve tiles via http
	Serve(tools::serve::Subcommand),
}

fn main() {
	let cli = Cli::parse();

	env_logger::Builder::new()
		.filter_level(cli.verbose.log_level_filter())
		.format_timestamp_millis()
		.init();

	if let Err(error) = run(cli) {
		log::error!("{error:#}");
		std::process::exit(1);
	}
}

fn run(cli: Cli) -> Result<()> {
	match &cli.command {
		Commands::Import(arguments) => tools::import::run(arguments),
		Commands::Benchmark(arguments) => tools::benchmark::run(arguments),
		Commands::Serve(arguments) => tools::serve::run(arguments),
	}
}
