//! Write-only encoder for Mapbox Vector Tiles, following
//! <https://github.com/mapbox/vector-tile-spec/blob/master/2.1/vector_tile.proto>.

mod layer;
mod value;

pub use layer::MvtLayer;
pub use value::MvtValue;

use tilery_core::io::ValueWriter;
use tilery_core::Blob;

/// One vector tile: an ordered list of named layers.
#[derive(Default)]
pub struct MvtTile {
	pub layers: Vec<MvtLayer>,
}

impl MvtTile {
	pub fn new() -> MvtTile {
		MvtTile { layers: Vec::new() }
	}

	pub fn add_layer(&mut self, layer: MvtLayer) {
		if !layer.is_empty() {
			self.layers.push(layer);
		}
	}

	pub fn is_empty(&self) -> bool {
		self.layers.is_empty()
	}

	pub fn to_blob(&self) -> Blob {
		let mut writer = ValueWriter::new();
		for layer in &self.layers {
			writer.write_pbf_key(3, 2);
			writer.write_pbf_slice(layer.to_blob().as_slice());
		}
		writer.into_blob()
	}
}
