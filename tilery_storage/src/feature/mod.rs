mod aggregate;
mod encoded_value;

pub use aggregate::{aggregate_line_features, aggregate_polygon_features};
pub use encoded_value::EncodedValue;

use crate::db::MetaCoding;
use anyhow::{bail, ensure, Context, Result};
use tilery_core::io::{ValueReader, ValueWriter};
use tilery_geometry::fixed::{self, FixedBox, FixedGeometry, FixedXy, INVALID_ZOOM_LEVEL};

pub const INVALID_FEATURE_ID: u64 = u64::MAX;
pub const INVALID_LAYER_ID: u32 = u32::MAX;

// field numbers of the serialized feature
const TAG_HEADER: u32 = 1;
const TAG_ID: u32 = 2;
const TAG_META_PAIRS: u32 = 3;
const TAG_META_KEY: u32 = 4;
const TAG_META_VALUE: u32 = 5;
const TAG_GEOMETRY: u32 = 7;

/// One map feature: identity, target layer, the zoom band it is visible in,
/// its metadata and its fixed geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
	pub id: u64,
	pub layer: u32,
	pub zoom_levels: (u32, u32),
	pub meta: Vec<(String, EncodedValue)>,
	pub geometry: FixedGeometry,
}

impl Default for Feature {
	fn default() -> Feature {
		Feature {
			id: INVALID_FEATURE_ID,
			layer: INVALID_LAYER_ID,
			zoom_levels: (0, INVALID_ZOOM_LEVEL),
			meta: Vec::new(),
			geometry: FixedGeometry::Null,
		}
	}
}

/// Serializes a feature. Metadata pairs found in `coding` are emitted as a
/// single dictionary index; everything else is written inline. Duplicate
/// metadata keys collapse to the last written value.
pub fn serialize_feature(feature: &Feature, coding: Option<&MetaCoding>) -> Result<Vec<u8>> {
	ensure!(feature.id != INVALID_FEATURE_ID, "feature without id");
	ensure!(feature.layer != INVALID_LAYER_ID, "feature without layer");
	let bbox = feature
		.geometry
		.bounding_box()
		.context("cannot serialize feature with empty geometry")?;

	let mut writer = ValueWriter::new();

	let mut header = ValueWriter::new();
	header.write_svarint(i64::from(feature.layer));
	header.write_svarint(i64::from(feature.zoom_levels.0));
	header.write_svarint(i64::from(feature.zoom_levels.1));
	header.write_svarint(bbox.min.x);
	header.write_svarint(bbox.min.y);
	header.write_svarint(bbox.max.x);
	header.write_svarint(bbox.max.y);
	writer.write_pbf_key(TAG_HEADER, 2);
	writer.write_pbf_slice(header.as_slice());

	writer.write_pbf_key(TAG_ID, 0);
	writer.write_varint(feature.id);

	// deduplicate by key, last write wins, keep first-write order
	let mut meta: Vec<(String, EncodedValue)> = Vec::new();
	for (key, value) in &feature.meta {
		if let Some(entry) = meta.iter_mut().find(|(k, _)| k == key) {
			entry.1 = value.clone();
		} else {
			meta.push((key.clone(), value.clone()));
		}
	}

	let mut shared = Vec::new();
	let mut inline = Vec::new();
	for (key, value) in &meta {
		match coding.and_then(|c| c.index_of(key, value)) {
			Some(index) => shared.push(index),
			None => inline.push((key, value)),
		}
	}

	if !shared.is_empty() {
		let mut packed = ValueWriter::new();
		for index in &shared {
			packed.write_varint(u64::from(*index));
		}
		writer.write_pbf_key(TAG_META_PAIRS, 2);
		writer.write_pbf_slice(packed.as_slice());
	}
	for (key, value) in inline {
		writer.write_pbf_key(TAG_META_KEY, 2);
		writer.write_pbf_string(key);
		writer.write_pbf_key(TAG_META_VALUE, 2);
		writer.write_pbf_slice(&value.to_bytes());
	}

	writer.write_pbf_key(TAG_GEOMETRY, 2);
	writer.write_pbf_slice(fixed::serialize(&feature.geometry)?.as_slice());

	Ok(writer.into_vec())
}

/// A parsed feature with the geometry still serialized, so callers can
/// filter on zoom range and bounding box before decoding vertices.
pub struct SerializedFeature<'a> {
	pub id: u64,
	pub layer: u32,
	pub zoom_levels: (u32, u32),
	pub bbox: FixedBox,
	shared_meta: Vec<u32>,
	inline_keys: Vec<String>,
	inline_values: Vec<EncodedValue>,
	geometry: &'a [u8],
}

pub fn parse_feature(data: &[u8]) -> Result<SerializedFeature<'_>> {
	let mut reader = ValueReader::new(data);

	let mut header = None;
	let mut id = None;
	let mut shared_meta = Vec::new();
	let mut inline_keys = Vec::new();
	let mut inline_values = Vec::new();
	let mut geometry = None;

	while reader.has_remaining() {
		match reader.read_pbf_key().context("truncated feature")? {
			(TAG_HEADER, 2) => {
				let mut h = reader.pbf_sub_reader()?;
				let layer = h.read_svarint()?;
				let zoom_min = h.read_svarint()?;
				let zoom_max = h.read_svarint()?;
				let bbox = FixedBox::new(
					FixedXy::new(h.read_svarint()?, h.read_svarint()?),
					FixedXy::new(h.read_svarint()?, h.read_svarint()?),
				);
				ensure!(layer >= 0 && zoom_min >= 0 && zoom_max >= 0, "invalid feature header");
				header = Some((layer as u32, (zoom_min as u32, zoom_max as u32), bbox));
			}
			(TAG_ID, 0) => id = Some(reader.read_varint()?),
			(TAG_META_PAIRS, 2) => {
				let mut packed = reader.pbf_sub_reader()?;
				while packed.has_remaining() {
					shared_meta.push(packed.read_varint()? as u32);
				}
			}
			(TAG_META_KEY, 2) => inline_keys.push(reader.read_pbf_string()?),
			(TAG_META_VALUE, 2) => {
				inline_values.push(EncodedValue::from_bytes(reader.read_pbf_slice()?)?)
			}
			(TAG_GEOMETRY, 2) => geometry = Some(reader.read_pbf_slice()?),
			(field, wire) => bail!("unexpected feature field ({field}, {wire})"),
		}
	}

	let (layer, zoom_levels, bbox) = header.context("feature header missing")?;
	ensure!(
		inline_keys.len() == inline_values.len(),
		"feature metadata keys and values out of sync"
	);
	Ok(SerializedFeature {
		id: id.context("feature id missing")?,
		layer,
		zoom_levels,
		bbox,
		shared_meta,
		inline_keys,
		inline_values,
		geometry: geometry.context("feature geometry missing")?,
	})
}

impl SerializedFeature<'_> {
	pub fn decode_meta(&self, coding: &MetaCoding) -> Result<Vec<(String, EncodedValue)>> {
		let mut meta = Vec::with_capacity(self.shared_meta.len() + self.inline_keys.len());
		for index in &self.shared_meta {
			let (key, value) = coding
				.pair(*index)
				.with_context(|| format!("unknown metadata coding index {index}"))?;
			meta.push((key.to_string(), value.clone()));
		}
		for (key, value) in self.inline_keys.iter().zip(&self.inline_values) {
			meta.push((key.clone(), value.clone()));
		}
		Ok(meta)
	}

	/// Decodes the geometry, applying simplify masks when `zoom` is given.
	pub fn decode_geometry(&self, zoom: Option<u32>) -> Result<FixedGeometry> {
		match zoom {
			Some(z) => fixed::deserialize_at_zoom(self.geometry, z),
			None => fixed::deserialize(self.geometry),
		}
	}

	pub fn into_feature(self, coding: &MetaCoding) -> Result<Feature> {
		Ok(Feature {
			id: self.id,
			layer: self.layer,
			zoom_levels: self.zoom_levels,
			meta: self.decode_meta(coding)?,
			geometry: self.decode_geometry(None)?,
		})
	}
}
