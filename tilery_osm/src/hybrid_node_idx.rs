use anyhow::{bail, ensure, Context, Result};
use std::fs::File;
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::Path;
use tilery_core::io::{ValueReader, ValueWriter};

// Raw OSM coordinates are hundredths of microdegrees; the offsets move them
// into [0, 2^32).
pub const COORD_PRECISION: i64 = 10_000_000;
pub const X_OFFSET: i64 = 180 * COORD_PRECISION;
pub const Y_OFFSET: i64 = 90 * COORD_PRECISION;

// Span split thresholds: a page-sized payload budget, an id gap bound, and
// a coordinate jump bound keeping payloads dense (a delta needing five or
// more varint bytes starts a fresh span).
const SPAN_PAYLOAD_BUDGET: usize = 4096;
const SPAN_MAX_ID_GAP: u64 = 1 << 16;
const SPAN_MAX_COORD_JUMP: u64 = 1 << 28;

const IDX_ENTRY_SIZE: usize = 24;

#[derive(Clone, Copy, Debug)]
struct SpanEntry {
	first_id: u64,
	dat_offset: u64,
	dat_len: u32,
	count: u32,
}

/// Streaming builder for the hybrid node index.
///
/// Nodes arrive with ids non-decreasing in absolute value and coordinates
/// already offset into `[0, 2^32)`. Runs of nearby ids with nearby
/// coordinates are delta-coded into one span; each finished span appends
/// its payload to the data file and one anchor entry to the index file.
pub struct HybridNodeIdxBuilder {
	idx_file: File,
	dat_file: File,
	dat_offset: u64,
	span: Option<OpenSpan>,
	last: Option<(u64, i64, i64)>,
	span_count: usize,
	node_count: u64,
}

struct OpenSpan {
	first_id: u64,
	last_id: u64,
	last_x: i64,
	last_y: i64,
	count: u32,
	payload: ValueWriter,
}

impl HybridNodeIdxBuilder {
	pub fn new(idx_file: File, dat_file: File) -> HybridNodeIdxBuilder {
		HybridNodeIdxBuilder {
			idx_file,
			dat_file,
			dat_offset: 0,
			span: None,
			last: None,
			span_count: 0,
			node_count: 0,
		}
	}

	pub fn push(&mut self, id: i64, x: i64, y: i64) -> Result<()> {
		ensure!(
			(0..(1 << 32)).contains(&x) && (0..(1 << 32)).contains(&y),
			"node coordinate ({x}, {y}) outside [0, 2^32)"
		);
		let id = id.unsigned_abs();

		if let Some((last_id, last_x, last_y)) = self.last {
			ensure!(
				id >= last_id,
				"node ids must be non-decreasing: {id} after {last_id}"
			);
			if id == last_id {
				if x == last_x && y == last_y {
					return Ok(()); // exact duplicate
				}
				bail!("node {id} pushed twice with different coordinates");
			}

			let gap = id - last_id;
			let jump = zigzag(x - last_x).max(zigzag(y - last_y));
			let payload_full = self
				.span
				.as_ref()
				.is_some_and(|span| span.payload.len() + 3 * 10 > SPAN_PAYLOAD_BUDGET);
			if gap > SPAN_MAX_ID_GAP || jump >= SPAN_MAX_COORD_JUMP || payload_full {
				self.flush_span()?;
			}
		}

		let span = self.span.get_or_insert_with(|| OpenSpan {
			first_id: id,
			last_id: id,
			last_x: 0,
			last_y: 0,
			count: 0,
			payload: ValueWriter::new(),
		});
		span.payload.write_svarint((id - span.last_id) as i64);
		span.payload.write_svarint(x - span.last_x);
		span.payload.write_svarint(y - span.last_y);
		span.last_id = id;
		span.last_x = x;
		span.last_y = y;
		span.count += 1;
		self.last = Some((id, x, y));
		self.node_count += 1;
		Ok(())
	}

	pub fn finish(&mut self) -> Result<()> {
		self.flush_span()?;
		self.idx_file.flush()?;
		self.dat_file.flush()?;
		Ok(())
	}

	pub fn span_count(&self) -> usize {
		self.span_count
	}

	pub fn dump_stats(&self) {
		log::info!(
			"node index: {} nodes in {} spans, {} payload bytes",
			self.node_count,
			self.span_count,
			self.dat_offset
		);
	}

	fn flush_span(&mut self) -> Result<()> {
		let Some(span) = self.span.take() else {
			return Ok(());
		};

		let mut entry = ValueWriter::new();
		entry.write_u64(span.first_id);
		entry.write_u64(self.dat_offset);
		entry.write_u32(span.payload.len() as u32);
		entry.write_u32(span.count);
		self.idx_file.write_all(entry.as_slice())?;
		self.dat_file.write_all(span.payload.as_slice())?;

		self.dat_offset += span.payload.len() as u64;
		self.span_count += 1;
		Ok(())
	}
}

fn zigzag(value: i64) -> u64 {
	((value << 1) ^ (value >> 63)) as u64
}

/// Random-access reader over a finished node index.
pub struct HybridNodeIdx {
	entries: Vec<SpanEntry>,
	dat_file: File,
}

impl HybridNodeIdx {
	pub fn open(idx_path: &Path, dat_path: &Path) -> Result<HybridNodeIdx> {
		let idx =
			std::fs::read(idx_path).with_context(|| format!("failed to read {idx_path:?}"))?;
		ensure!(
			idx.len() % IDX_ENTRY_SIZE == 0,
			"corrupt node index: truncated index file"
		);
		let dat_file =
			File::open(dat_path).with_context(|| format!("failed to open {dat_path:?}"))?;
		let dat_len = dat_file.metadata()?.len();

		let mut reader = ValueReader::new(&idx);
		let mut entries = Vec::with_capacity(idx.len() / IDX_ENTRY_SIZE);
		let mut previous_id = 0u64;
		while reader.has_remaining() {
			let entry = SpanEntry {
				first_id: reader.read_u64()?,
				dat_offset: reader.read_u64()?,
				dat_len: reader.read_u32()?,
				count: reader.read_u32()?,
			};
			ensure!(
				entries.is_empty() || entry.first_id > previous_id,
				"corrupt node index: spans out of order"
			);
			ensure!(
				entry.dat_offset + u64::from(entry.dat_len) <= dat_len,
				"corrupt node index: span outside data file"
			);
			previous_id = entry.first_id;
			entries.push(entry);
		}

		Ok(HybridNodeIdx { entries, dat_file })
	}

	/// Looks up the coordinates of a node; negative ids fold to their
	/// absolute value.
	pub fn get(&self, id: i64) -> Result<Option<(i64, i64)>> {
		let id = id.unsigned_abs();
		let Some(entry) = self.span_for(id) else {
			return Ok(None);
		};
		self.scan_span(entry, id)
	}

	/// Batched lookup: results are written in place, missing ids stay
	/// `None`. Queries may be unsorted and may repeat ids.
	pub fn get_batch(&self, queries: &mut [(i64, Option<(i64, i64)>)]) -> Result<()> {
		let mut order: Vec<usize> = (0..queries.len()).collect();
		order.sort_by_key(|i| queries[*i].0.unsigned_abs());

		let mut current: Option<(SpanEntry, Vec<u8>)> = None;
		for i in order {
			let id = queries[i].0.unsigned_abs();
			let Some(entry) = self.span_for(id) else {
				continue;
			};

			let reload = match &current {
				Some((loaded, _)) => loaded.first_id != entry.first_id,
				None => true,
			};
			if reload {
				current = Some((entry, self.read_span(&entry)?));
			}
			let payload = &current.as_ref().unwrap().1;
			queries[i].1 = scan_payload(payload, entry.first_id, id)?;
		}
		Ok(())
	}

	fn span_for(&self, id: u64) -> Option<SpanEntry> {
		let position = self.entries.partition_point(|entry| entry.first_id <= id);
		if position == 0 {
			return None;
		}
		Some(self.entries[position - 1])
	}

	fn read_span(&self, entry: &SpanEntry) -> Result<Vec<u8>> {
		let mut payload = vec![0u8; entry.dat_len as usize];
		self.dat_file
			.read_exact_at(&mut payload, entry.dat_offset)
			.context("failed to read node index span")?;
		Ok(payload)
	}

	fn scan_span(&self, entry: SpanEntry, id: u64) -> Result<Option<(i64, i64)>> {
		scan_payload(&self.read_span(&entry)?, entry.first_id, id)
	}
}

fn scan_payload(payload: &[u8], first_id: u64, target: u64) -> Result<Option<(i64, i64)>> {
	let mut reader = ValueReader::new(payload);
	let mut id = first_id;
	let mut x = 0i64;
	let mut y = 0i64;

	while reader.has_remaining() {
		id += reader.read_svarint()? as u64;
		x += reader.read_svarint()?;
		y += reader.read_svarint()?;
		if id == target {
			return Ok(Some((x, y)));
		}
		if id > target {
			break;
		}
	}
	Ok(None)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs::OpenOptions;
	use tempfile::TempDir;

	struct Fixture {
		_dir: TempDir,
		idx_path: std::path::PathBuf,
		dat_path: std::path::PathBuf,
	}

	fn fixture() -> Fixture {
		let dir = tempfile::tempdir().unwrap();
		Fixture {
			idx_path: dir.path().join("idx.bin"),
			dat_path: dir.path().join("dat.bin"),
			_dir: dir,
		}
	}

	fn builder(fixture: &Fixture) -> HybridNodeIdxBuilder {
		let open = |path| {
			OpenOptions::new()
				.create(true)
				.write(true)
				.truncate(true)
				.open(path)
				.unwrap()
		};
		HybridNodeIdxBuilder::new(open(&fixture.idx_path), open(&fixture.dat_path))
	}

	fn reader(fixture: &Fixture) -> HybridNodeIdx {
		HybridNodeIdx::open(&fixture.idx_path, &fixture.dat_path).unwrap()
	}

	#[test]
	fn empty_index() -> Result<()> {
		let fixture = fixture();
		builder(&fixture).finish()?;

		let nodes = reader(&fixture);
		assert_eq!(nodes.get(0)?, None);
		Ok(())
	}

	#[test]
	fn single_entry() -> Result<()> {
		let fixture = fixture();
		let mut builder = builder(&fixture);
		builder.push(42, 2, 3)?;
		builder.finish()?;

		let nodes = reader(&fixture);
		assert_eq!(nodes.get(0)?, None);
		assert_eq!(nodes.get(100)?, None);
		assert_eq!(nodes.get(42)?, Some((2, 3)));

		let mut batch = vec![(42i64, None)];
		nodes.get_batch(&mut batch)?;
		assert_eq!(batch[0].1, Some((2, 3)));
		Ok(())
	}

	#[test]
	fn consecutive_entries() -> Result<()> {
		let fixture = fixture();
		let mut builder = builder(&fixture);
		builder.push(42, 2, 3)?;
		builder.push(43, 5, 6)?;
		builder.push(44, 8, 9)?;
		builder.finish()?;

		let nodes = reader(&fixture);
		assert_eq!(nodes.get(0)?, None);
		assert_eq!(nodes.get(100)?, None);
		assert_eq!(nodes.get(42)?, Some((2, 3)));
		assert_eq!(nodes.get(43)?, Some((5, 6)));
		assert_eq!(nodes.get(44)?, Some((8, 9)));

		// unsorted batch with a repeated id
		let mut batch = vec![(43i64, None), (44, None), (43, None), (42, None)];
		nodes.get_batch(&mut batch)?;
		assert_eq!(batch[0].1, Some((5, 6)));
		assert_eq!(batch[1].1, Some((8, 9)));
		assert_eq!(batch[2].1, Some((5, 6)));
		assert_eq!(batch[3].1, Some((2, 3)));
		Ok(())
	}

	#[test]
	fn entries_with_gaps() -> Result<()> {
		let fixture = fixture();
		let mut builder = builder(&fixture);
		builder.push(42, 2, 3)?;
		builder.push(44, 8, 9)?;
		builder.push(45, 1, 2)?;
		builder.push(46, 4, 5)?;
		builder.finish()?;

		let nodes = reader(&fixture);
		for missing in [0, 41, 43, 47, 100] {
			assert_eq!(nodes.get(missing)?, None, "id {missing}");
		}
		assert_eq!(nodes.get(42)?, Some((2, 3)));
		assert_eq!(nodes.get(44)?, Some((8, 9)));
		assert_eq!(nodes.get(45)?, Some((1, 2)));
		assert_eq!(nodes.get(46)?, Some((4, 5)));

		let mut batch = vec![(41i64, None), (44, None), (47, None)];
		nodes.get_batch(&mut batch)?;
		assert_eq!(batch[0].1, None);
		assert_eq!(batch[1].1, Some((8, 9)));
		assert_eq!(batch[2].1, None);
		Ok(())
	}

	#[test]
	fn artificial_splits() -> Result<()> {
		let fixture = fixture();
		let mut builder = builder(&fixture);
		builder.push(42, 2, 3)?;
		builder.push(43, 2, 7)?;
		builder.push(44, (1 << 28) + 14, (1 << 28) + 15)?;
		builder.push(45, (1 << 28) + 16, (1 << 28) + 17)?;
		builder.finish()?;
		assert_eq!(builder.span_count(), 2);

		let nodes = reader(&fixture);
		assert_eq!(nodes.get(41)?, None);
		assert_eq!(nodes.get(46)?, None);
		assert_eq!(nodes.get(42)?, Some((2, 3)));
		assert_eq!(nodes.get(43)?, Some((2, 7)));
		assert_eq!(nodes.get(44)?, Some(((1 << 28) + 14, (1 << 28) + 15)));
		assert_eq!(nodes.get(45)?, Some(((1 << 28) + 16, (1 << 28) + 17)));
		Ok(())
	}

	#[test]
	fn id_gaps_split_spans() -> Result<()> {
		let fixture = fixture();
		let mut builder = builder(&fixture);
		builder.push(1, 10, 10)?;
		builder.push(2, 11, 11)?;
		builder.push(2 + (1 << 17), 12, 12)?;
		builder.finish()?;
		assert_eq!(builder.span_count(), 2);

		let nodes = reader(&fixture);
		assert_eq!(nodes.get(2)?, Some((11, 11)));
		assert_eq!(nodes.get(2 + (1 << 17))?, Some((12, 12)));
		Ok(())
	}

	#[test]
	fn large_coordinates() -> Result<()> {
		let fixture = fixture();
		let mut builder = builder(&fixture);
		builder.push(42, 2_251_065_056, 1_454_559_573)?;
		builder.finish()?;

		let nodes = reader(&fixture);
		assert_eq!(nodes.get(41)?, None);
		assert_eq!(nodes.get(42)?, Some((2_251_065_056, 1_454_559_573)));
		assert_eq!(nodes.get(43)?, None);
		Ok(())
	}

	#[test]
	fn coordinate_limits() -> Result<()> {
		let fixture = fixture();
		let mut builder = builder(&fixture);

		assert!(builder.push(42, -2, 3).is_err());
		assert!(builder.push(42, 2, -3).is_err());
		builder.push(42, 2, 3)?;
		assert!(builder.push(43, 1 << 32, 3).is_err());
		assert!(builder.push(43, 2, 1 << 32).is_err());
		Ok(())
	}

	#[test]
	fn negative_ids_fold() -> Result<()> {
		let fixture = fixture();
		let mut builder = builder(&fixture);
		builder.push(-42, 1, 1)?;
		builder.push(-43, 2, 2)?;
		builder.finish()?;

		let nodes = reader(&fixture);
		assert_eq!(nodes.get(42)?, Some((1, 1)));
		assert_eq!(nodes.get(-42)?, Some((1, 1)));
		assert_eq!(nodes.get(43)?, Some((2, 2)));
		assert_eq!(nodes.get(-43)?, Some((2, 2)));
		Ok(())
	}

	#[test]
	fn duplicates() -> Result<()> {
		let fixture = fixture();
		let mut builder = builder(&fixture);
		builder.push(-42, 1, 1)?;
		builder.push(-42, 1, 1)?;
		builder.push(42, 1, 1)?;
		builder.push(42, 1, 1)?;
		builder.push(-42, 1, 1)?;
		builder.finish()?;

		let nodes = reader(&fixture);
		assert_eq!(nodes.get(42)?, Some((1, 1)));
		assert_eq!(nodes.get(-42)?, Some((1, 1)));
		Ok(())
	}

	#[test]
	fn mismatched_duplicates_fail() -> Result<()> {
		let fixture = fixture();
		let mut builder = builder(&fixture);
		builder.push(-42, 1, 1)?;
		assert!(builder.push(-42, 2, 2).is_err());
		assert!(builder.push(42, 2, 2).is_err());
		Ok(())
	}

	#[test]
	fn non_decreasing_ids_enforced() -> Result<()> {
		let fixture = fixture();
		let mut builder = builder(&fixture);
		builder.push(42, 1, 1)?;
		assert!(builder.push(41, 1, 1).is_err());
		Ok(())
	}

	#[test]
	fn truncated_files_fail_on_open() -> Result<()> {
		let fixture = fixture();
		let mut builder = builder(&fixture);
		builder.push(42, 2, 3)?;
		builder.finish()?;

		// cut one byte off the index file
		let idx = std::fs::read(&fixture.idx_path)?;
		std::fs::write(&fixture.idx_path, &idx[..idx.len() - 1])?;
		assert!(HybridNodeIdx::open(&fixture.idx_path, &fixture.dat_path).is_err());

		// restore the index but truncate the data file
		std::fs::write(&fixture.idx_path, &idx)?;
		std::fs::write(&fixture.dat_path, [0u8])?;
		assert!(HybridNodeIdx::open(&fixture.idx_path, &fixture.dat_path).is_err());
		Ok(())
	}

	#[test]
	fn survives_reopening_many_spans() -> Result<()> {
		let fixture = fixture();
		let mut builder = builder(&fixture);
		// force plenty of spans through coordinate jumps
		for i in 0..1000i64 {
			let flip = if i % 2 == 0 { 0 } else { 1i64 << 30 };
			builder.push(i * 3, 1000 + flip, 2000 + flip)?;
		}
		builder.finish()?;
		assert!(builder.span_count() > 100);

		let nodes = reader(&fixture);
		for i in 0..1000i64 {
			let flip = if i % 2 == 0 { 0 } else { 1i64 << 30 };
			assert_eq!(nodes.get(i * 3)?, Some((1000 + flip, 2000 + flip)));
			assert_eq!(nodes.get(i * 3 + 1)?, None);
		}
		Ok(())
	}
}
