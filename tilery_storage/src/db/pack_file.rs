use anyhow::{ensure, Context, Result};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use tilery_core::io::{ValueReader, ValueWriter};

/// A byte range in the append-only pack file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PackRecord {
	pub offset: u64,
	pub length: u32,
}

impl PackRecord {
	pub fn new(offset: u64, length: u32) -> PackRecord {
		PackRecord { offset, length }
	}
}

const RECORD_SIZE: usize = 12;

/// Serializes records back-to-back: `u64 offset, u32 length` each.
pub fn pack_records_serialize(records: &[PackRecord]) -> Vec<u8> {
	let mut writer = ValueWriter::new();
	for record in records {
		writer.write_u64(record.offset);
		writer.write_u32(record.length);
	}
	writer.into_vec()
}

/// Appends one record to a serialized record list.
pub fn pack_records_update(buf: &mut Vec<u8>, record: PackRecord) {
	buf.extend_from_slice(&pack_records_serialize(&[record]));
}

pub fn pack_records_deserialize(buf: &[u8]) -> Result<Vec<PackRecord>> {
	let mut records = Vec::with_capacity(buf.len() / RECORD_SIZE);
	pack_records_foreach(buf, |record| records.push(record))?;
	Ok(records)
}

pub fn pack_records_foreach(buf: &[u8], mut f: impl FnMut(PackRecord)) -> Result<()> {
	ensure!(
		buf.len() % RECORD_SIZE == 0,
		"pack record list has invalid length {}",
		buf.len()
	);
	let mut reader = ValueReader::new(buf);
	while reader.has_remaining() {
		f(PackRecord {
			offset: reader.read_u64()?,
			length: reader.read_u32()?,
		});
	}
	Ok(())
}

/// The append-only pack file: a single writer appends opaque byte spans,
/// any number of readers fetch them back by record.
pub struct PackHandle {
	file: File,
	end: u64,
}

impl PackHandle {
	pub fn open(path: &Path) -> Result<PackHandle> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(false)
			.open(path)
			.with_context(|| format!("failed to open pack file {path:?}"))?;
		let end = file.metadata()?.len();
		Ok(PackHandle { file, end })
	}

	pub fn len(&self) -> u64 {
		self.end
	}

	pub fn is_empty(&self) -> bool {
		self.end == 0
	}

	/// Appends a span and returns its record.
	pub fn append(&mut self, data: &[u8]) -> Result<PackRecord> {
		ensure!(data.len() <= u32::MAX as usize, "pack span too large");
		let record = PackRecord::new(self.end, data.len() as u32);
		self.file
			.write_all_at(data, record.offset)
			.context("failed to append to pack file")?;
		self.end += data.len() as u64;
		Ok(record)
	}

	pub fn read(&self, record: &PackRecord) -> Result<Vec<u8>> {
		ensure!(
			record.offset + u64::from(record.length) <= self.end,
			"pack record {record:?} outside pack file (len {})",
			self.end
		);
		let mut buf = vec![0u8; record.length as usize];
		self.file
			.read_exact_at(&mut buf, record.offset)
			.with_context(|| format!("failed to read pack record {record:?}"))?;
		Ok(buf)
	}
}
