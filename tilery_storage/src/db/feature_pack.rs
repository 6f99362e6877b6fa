use super::pack_file::PackRecord;
use super::quad_tree::{make_quad_tree, QuadTreeInput};
use anyhow::{ensure, Context, Result};
use tilery_core::io::{ValueReader, ValueWriter};
use tilery_core::Tile;

// Pack layout:
//   u32  feature count (total over all segments)
//   u8   segment count
//   per segment: varint x, y, z | u8 kind | varint record count | records
//   u32  index length, index bytes (u64 span base + quad tree cells)
//   body (length-prefixed features, or inline child packs)
//   u8   0x00 terminator
//
// A quick pack (ingest) has no segments and carries its features in the
// body. An optimal pack (repack output) addresses per-tile spans of the
// pack file through its quad tree; the inline segment kind exists so packs
// can also embed whole child packs.
const SEGMENT_INLINE: u8 = 0;
const SEGMENT_PACK_FILE: u8 = 1;

const EMPTY_PACK_SIZE: usize = 10;

/// A sub-pack reference inside an optimal feature pack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackSegment {
	pub tile: Tile,
	pub kind: u8,
	pub records: Vec<PackRecord>,
}

/// A parsed feature pack header with borrowed body.
pub struct FeaturePack<'a> {
	pub feature_count: u32,
	pub segments: Vec<PackSegment>,
	pub index_base: u64,
	pub quad_tree: &'a [u8],
	body: &'a [u8],
	data: &'a [u8],
}

/// Packs serialized features into a quick pack: no segments, features
/// length-prefixed in the body.
pub fn pack_features_quick(features: &[Vec<u8>]) -> Vec<u8> {
	let mut writer = ValueWriter::new();
	writer.write_u32(features.len() as u32);
	writer.write_u8(0);
	writer.write_u32(0);
	for feature in features {
		writer.write_pbf_slice(feature);
	}
	writer.write_u8(0);
	writer.into_vec()
}

/// Composes an optimal pack for `tile` from pack-file resident sub-packs
/// (indexed by a quad tree) and whole child packs embedded in the body.
pub fn pack_features_optimal(
	tile: Tile,
	sub_packs: &[(Tile, Vec<PackRecord>, u32)],
	child_packs: &[&[u8]],
) -> Result<Vec<u8>> {
	let segment_count = sub_packs.len() + child_packs.len();
	ensure!(segment_count <= u8::MAX as usize, "too many pack segments");

	let mut feature_count: u64 = 0;
	for (_, _, count) in sub_packs {
		feature_count += u64::from(*count);
	}
	for child in child_packs {
		feature_count += u64::from(FeaturePack::parse(child)?.feature_count);
	}

	// pack-file spans become quad tree entries, relative to the span base
	let index = if sub_packs.is_empty() {
		Vec::new()
	} else {
		let base = sub_packs
			.iter()
			.flat_map(|(_, records, _)| records)
			.map(|record| record.offset)
			.min()
			.unwrap_or(0);
		let mut inputs = Vec::new();
		for (sub_tile, records, _) in sub_packs {
			for record in records {
				let offset = record.offset - base;
				ensure!(offset <= u64::from(u32::MAX), "pack segment span too wide");
				inputs.push(QuadTreeInput {
					tile: *sub_tile,
					offset: offset as u32,
					size: record.length,
				});
			}
		}
		let tree = make_quad_tree(tile, &inputs).context("failed to index pack segments")?;
		let mut writer = ValueWriter::new();
		writer.write_u64(base);
		writer.write_slice(&tree);
		writer.into_vec()
	};

	let mut writer = ValueWriter::new();
	writer.write_u32(feature_count as u32);
	writer.write_u8(segment_count as u8);

	// header size is needed to compute inline body offsets up front
	let mut header_size = 4 + 1;
	for (sub_tile, records, _) in sub_packs {
		header_size += segment_header_size(sub_tile, records.len());
	}
	for _ in child_packs {
		header_size += segment_header_size(&tile, 1);
	}
	header_size += 4 + index.len();

	for (sub_tile, records, _) in sub_packs {
		write_segment(&mut writer, sub_tile, SEGMENT_PACK_FILE, records);
	}
	let mut body_offset = header_size as u64;
	for child in child_packs {
		let record = PackRecord::new(body_offset, child.len() as u32);
		write_segment(&mut writer, &tile, SEGMENT_INLINE, &[record]);
		body_offset += child.len() as u64;
	}

	writer.write_u32(index.len() as u32);
	writer.write_slice(&index);
	debug_assert_eq!(writer.len(), header_size);

	for child in child_packs {
		writer.write_slice(child);
	}
	writer.write_u8(0);
	Ok(writer.into_vec())
}

fn segment_header_size(tile: &Tile, record_count: usize) -> usize {
	let mut writer = ValueWriter::new();
	writer.write_varint(u64::from(tile.x));
	writer.write_varint(u64::from(tile.y));
	writer.write_varint(u64::from(tile.z));
	writer.write_varint(record_count as u64);
	writer.len() + 1 + record_count * 12
}

fn write_segment(writer: &mut ValueWriter, tile: &Tile, kind: u8, records: &[PackRecord]) {
	writer.write_varint(u64::from(tile.x));
	writer.write_varint(u64::from(tile.y));
	writer.write_varint(u64::from(tile.z));
	writer.write_u8(kind);
	writer.write_varint(records.len() as u64);
	for record in records {
		writer.write_u64(record.offset);
		writer.write_u32(record.length);
	}
}

impl<'a> FeaturePack<'a> {
	pub fn parse(data: &'a [u8]) -> Result<FeaturePack<'a>> {
		ensure!(data.len() >= EMPTY_PACK_SIZE, "feature pack too small");
		ensure!(data[data.len() - 1] == 0, "feature pack not terminated");

		let mut reader = ValueReader::new(data);
		let feature_count = reader.read_u32()?;
		let segment_count = reader.read_u8()?;

		let mut segments = Vec::with_capacity(segment_count as usize);
		for _ in 0..segment_count {
			let x = reader.read_varint()? as u32;
			let y = reader.read_varint()? as u32;
			let z = reader.read_varint()? as u32;
			let tile = Tile::new(x, y, z);
			ensure!(tile.is_valid(), "invalid segment tile {tile:?}");

			let kind = reader.read_u8()?;
			ensure!(
				kind == SEGMENT_INLINE || kind == SEGMENT_PACK_FILE,
				"invalid segment kind {kind}"
			);
			let record_count = reader.read_varint()? as usize;
			let mut records = Vec::with_capacity(record_count);
			for _ in 0..record_count {
				records.push(PackRecord {
					offset: reader.read_u64()?,
					length: reader.read_u32()?,
				});
			}
			segments.push(PackSegment { tile, kind, records });
		}

		let index_size = reader.read_u32()? as usize;
		ensure!(
			index_size == 0 || index_size >= 8 + 16,
			"invalid pack index size {index_size}"
		);
		let (index_base, quad_tree) = if index_size > 0 {
			let mut index_reader = reader.sub_reader(index_size)?;
			let base = index_reader.read_u64()?;
			(base, index_reader.read_slice(index_size - 8)?)
		} else {
			(0, &data[0..0])
		};

		let body = &data[reader.position()..data.len() - 1];

		// inline segments must point inside this pack
		for segment in &segments {
			if segment.kind == SEGMENT_INLINE {
				for record in &segment.records {
					ensure!(
						record.offset + u64::from(record.length) <= data.len() as u64 - 1,
						"inline segment outside pack"
					);
				}
			}
		}

		Ok(FeaturePack {
			feature_count,
			segments,
			index_base,
			quad_tree,
			body,
			data,
		})
	}

	pub fn has_segments(&self) -> bool {
		!self.segments.is_empty()
	}

	/// The records of all pack-file resident segments.
	pub fn pack_file_records(&self) -> Vec<PackRecord> {
		self
			.segments
			.iter()
			.filter(|segment| segment.kind == SEGMENT_PACK_FILE)
			.flat_map(|segment| segment.records.iter().copied())
			.collect()
	}

	/// Calls `f` for every serialized leaf feature reachable without the
	/// pack file: the own body of a quick pack and all inline child packs.
	pub fn for_each_feature(&self, f: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<()> {
		if self.segments.is_empty() {
			let mut reader = ValueReader::new(self.body);
			for _ in 0..self.feature_count {
				f(reader.read_pbf_slice().context("truncated feature body")?)?;
			}
			return Ok(());
		}

		for segment in &self.segments {
			if segment.kind != SEGMENT_INLINE {
				continue;
			}
			for record in &segment.records {
				let child =
					&self.data[record.offset as usize..(record.offset + u64::from(record.length)) as usize];
				FeaturePack::parse(child)?.for_each_feature(f)?;
			}
		}
		Ok(())
	}
}

/// Checks the structural integrity of a pack without touching the pack file.
pub fn feature_pack_valid(pack: &[u8]) -> bool {
	let Ok(parsed) = FeaturePack::parse(pack) else {
		return false;
	};
	let mut count = 0u32;
	if parsed.segments.is_empty() {
		if parsed.for_each_feature(&mut |_| {
			count += 1;
			Ok(())
		})
		.is_err()
		{
			return false;
		}
		return count == parsed.feature_count;
	}
	true
}

/// Iterates every leaf feature of the pack.
pub fn unpack_features(pack: &[u8], mut f: impl FnMut(&[u8])) -> Result<()> {
	FeaturePack::parse(pack)?.for_each_feature(&mut |feature| {
		f(feature);
		Ok(())
	})
}

/// Iterates leaf features restricted to segments overlapping `query`; packs
/// without segments are iterated completely.
pub fn unpack_features_overlapping(pack: &[u8], query: &Tile, mut f: impl FnMut(&[u8])) -> Result<()> {
	let parsed = FeaturePack::parse(pack)?;
	if parsed.segments.is_empty() {
		return parsed.for_each_feature(&mut |feature| {
			f(feature);
			Ok(())
		});
	}

	for segment in &parsed.segments {
		if segment.kind != SEGMENT_INLINE {
			continue;
		}
		if !(segment.tile.is_ancestor_of(query) || query.is_ancestor_of(&segment.tile)) {
			continue;
		}
		for record in &segment.records {
			let child = &parsed.data
				[record.offset as usize..(record.offset + u64::from(record.length)) as usize];
			FeaturePack::parse(child)?.for_each_feature(&mut |feature| {
				f(feature);
				Ok(())
			})?;
		}
	}
	Ok(())
}
