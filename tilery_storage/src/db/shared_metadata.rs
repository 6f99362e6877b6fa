use super::database::{TileDatabase, META_KEY_FEATURE_META_CODING};
use crate::feature::EncodedValue;
use anyhow::{Context, Result};
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::Mutex;
use tilery_core::io::{ValueReader, ValueWriter};
use tilery_core::Blob;

/// Counts `(key, value)` metadata pairs during ingest. The most frequent
/// pairs form the shared coding dictionary, which is frozen once stored.
pub struct SharedMetadataBuilder {
	counts: Mutex<HashMap<(String, Vec<u8>), u64>>,
	min_count: u64,
}

impl SharedMetadataBuilder {
	pub fn new(min_count: u64) -> SharedMetadataBuilder {
		SharedMetadataBuilder {
			counts: Mutex::new(HashMap::new()),
			min_count,
		}
	}

	pub fn record(&self, key: &str, value: &EncodedValue) {
		let mut counts = self.counts.lock().unwrap();
		*counts
			.entry((key.to_string(), value.to_bytes()))
			.or_insert(0) += 1;
	}

	/// Persists the frequency-sorted dictionary of pairs seen at least
	/// `min_count` times.
	pub fn store(&self, db: &TileDatabase) -> Result<()> {
		let counts = self.counts.lock().unwrap();
		let pairs = counts
			.iter()
			.filter(|(_, count)| **count >= self.min_count)
			.sorted_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)))
			.map(|((key, value), _)| {
				Ok((key.clone(), EncodedValue::from_bytes(value)?))
			})
			.collect::<Result<Vec<_>>>()?;

		db.put_meta(META_KEY_FEATURE_META_CODING, &MetaCoding::new(pairs).to_blob())
	}
}

/// The frozen metadata coding dictionary: pair lookup while serializing,
/// index lookup while deserializing.
#[derive(Debug, Default)]
pub struct MetaCoding {
	pairs: Vec<(String, EncodedValue)>,
	lookup: HashMap<(String, Vec<u8>), u32>,
}

impl MetaCoding {
	pub fn new(pairs: Vec<(String, EncodedValue)>) -> MetaCoding {
		let lookup = pairs
			.iter()
			.enumerate()
			.map(|(index, (key, value))| ((key.clone(), value.to_bytes()), index as u32))
			.collect();
		MetaCoding { pairs, lookup }
	}

	pub fn len(&self) -> usize {
		self.pairs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.pairs.is_empty()
	}

	pub fn index_of(&self, key: &str, value: &EncodedValue) -> Option<u32> {
		self.lookup
			.get(&(key.to_string(), value.to_bytes()))
			.copied()
	}

	pub fn pair(&self, index: u32) -> Option<&(String, EncodedValue)> {
		self.pairs.get(index as usize)
	}

	pub fn to_blob(&self) -> Blob {
		let mut writer = ValueWriter::new();
		for (key, value) in &self.pairs {
			writer.write_pbf_string(key);
			writer.write_pbf_slice(&value.to_bytes());
		}
		writer.into_blob()
	}

	pub fn from_blob(blob: &Blob) -> Result<MetaCoding> {
		let mut reader = ValueReader::new(blob.as_slice());
		let mut pairs = Vec::new();
		while reader.has_remaining() {
			let key = reader.read_pbf_string().context("invalid meta coding key")?;
			let value = EncodedValue::from_bytes(reader.read_pbf_slice()?)
				.context("invalid meta coding value")?;
			pairs.push((key, value));
		}
		Ok(MetaCoding::new(pairs))
	}

	pub fn load(db: &TileDatabase) -> Result<MetaCoding> {
		match db.get_meta(META_KEY_FEATURE_META_CODING)? {
			Some(blob) => MetaCoding::from_blob(&blob),
			None => Ok(MetaCoding::default()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn blob_roundtrip() -> Result<()> {
		let coding = MetaCoding::new(vec![
			("highway".to_string(), EncodedValue::String("residential".to_string())),
			("oneway".to_string(), EncodedValue::Bool(true)),
			("layer".to_string(), EncodedValue::Integer(-1)),
		]);

		let restored = MetaCoding::from_blob(&coding.to_blob())?;
		assert_eq!(restored.len(), 3);
		assert_eq!(
			restored.index_of("oneway", &EncodedValue::Bool(true)),
			Some(1)
		);
		assert_eq!(
			restored.pair(2),
			Some(&("layer".to_string(), EncodedValue::Integer(-1)))
		);
		assert_eq!(restored.index_of("oneway", &EncodedValue::Bool(false)), None);
		assert_eq!(restored.pair(7), None);
		Ok(())
	}

	#[test]
	fn empty_coding() -> Result<()> {
		let coding = MetaCoding::default();
		assert!(coding.is_empty());
		assert_eq!(MetaCoding::from_blob(&coding.to_blob())?.len(), 0);
		Ok(())
	}

	#[test]
	fn builder_sorts_by_frequency() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let db = super::super::database::open_tile_database(&dir.path().join("t.db"))?;

		let builder = SharedMetadataBuilder::new(2);
		let rare = ("name".to_string(), EncodedValue::String("unique".to_string()));
		let common = ("highway".to_string(), EncodedValue::String("primary".to_string()));
		let medium = ("oneway".to_string(), EncodedValue::Bool(true));

		builder.record(&rare.0, &rare.1);
		for _ in 0..5 {
			builder.record(&common.0, &common.1);
		}
		for _ in 0..3 {
			builder.record(&medium.0, &medium.1);
		}
		builder.store(&db)?;

		let coding = MetaCoding::load(&db)?;
		assert_eq!(coding.len(), 2);
		assert_eq!(coding.index_of(&common.0, &common.1), Some(0));
		assert_eq!(coding.index_of(&medium.0, &medium.1), Some(1));
		assert_eq!(coding.index_of(&rare.0, &rare.1), None);
		Ok(())
	}
}
