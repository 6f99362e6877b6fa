use super::database::{TileDatabase, META_KEY_LAYER_NAMES};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use tilery_core::io::{ValueReader, ValueWriter};
use tilery_core::Blob;

/// Serializes layer names as length-prefixed strings.
pub fn write_layer_names(names: &[String]) -> Blob {
	let mut writer = ValueWriter::new();
	for name in names {
		writer.write_pbf_string(name);
	}
	writer.into_blob()
}

pub fn read_layer_names(blob: &Blob) -> Result<Vec<String>> {
	let mut reader = ValueReader::new(blob.as_slice());
	let mut names = Vec::new();
	while reader.has_remaining() {
		names.push(reader.read_pbf_string().context("invalid layer name list")?);
	}
	Ok(names)
}

/// Assigns stable layer ids in first-use order; shared by the parallel
/// feature handlers during import.
#[derive(Default)]
pub struct LayerNamesBuilder {
	state: Mutex<(Vec<String>, HashMap<String, u32>)>,
}

impl LayerNamesBuilder {
	pub fn new() -> LayerNamesBuilder {
		LayerNamesBuilder::default()
	}

	/// Seeds the builder with already persisted names, so ids stay stable
	/// across separate import runs.
	pub fn from_database(db: &TileDatabase) -> Result<LayerNamesBuilder> {
		let builder = LayerNamesBuilder::new();
		for name in load_layer_names(db)? {
			builder.layer_id(&name);
		}
		Ok(builder)
	}

	pub fn layer_id(&self, name: &str) -> u32 {
		let mut state = self.state.lock().unwrap();
		if let Some(id) = state.1.get(name) {
			return *id;
		}
		let id = state.0.len() as u32;
		state.0.push(name.to_string());
		state.1.insert(name.to_string(), id);
		id
	}

	pub fn store(&self, db: &TileDatabase) -> Result<()> {
		let state = self.state.lock().unwrap();
		db.put_meta(META_KEY_LAYER_NAMES, &write_layer_names(&state.0))
	}
}

/// Loads the layer name dictionary persisted during import.
pub fn load_layer_names(db: &TileDatabase) -> Result<Vec<String>> {
	match db.get_meta(META_KEY_LAYER_NAMES)? {
		Some(blob) => read_layer_names(&blob),
		None => Ok(Vec::new()),
	}
}
