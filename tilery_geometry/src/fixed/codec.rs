use super::{
	DeltaDecoder, DeltaEncoder, FixedGeometry, FixedPolygon, FixedPolyline, FixedXy,
	SimplifyMaskReader, SimplePolygon,
};
use super::simplify::make_simplify_mask;
use anyhow::{bail, ensure, Context, Result};
use tilery_core::io::{ValueReader, ValueWriter};
use tilery_core::Blob;

// field numbers of the fixed geometry message
const TAG_TYPE: u32 = 1;
const TAG_SIMPLIFY_MASK: u32 = 2;
const TAG_GEOMETRY: u32 = 3;

const TYPE_POINT: u64 = 1;
const TYPE_POLYLINE: u64 = 2;
const TYPE_POLYGON: u64 = 3;

/// Serializes a fixed geometry: a type tag, one simplify mask per ring
/// (polylines and polygons only) and the packed zig-zag delta stream.
pub fn serialize(geometry: &FixedGeometry) -> Result<Blob> {
	let mut writer = ValueWriter::new();
	writer.write_pbf_key(TAG_TYPE, 0);

	let mut stream = GeomEncoder::new();
	match geometry {
		FixedGeometry::Null => bail!("cannot serialize null geometry"),
		FixedGeometry::Point(points) => {
			ensure!(!points.is_empty(), "cannot serialize empty multi-point");
			writer.write_varint(TYPE_POINT);
			stream.write_points(points);
		}
		FixedGeometry::Polyline(lines) => {
			ensure!(!lines.is_empty(), "cannot serialize empty polyline");
			writer.write_varint(TYPE_POLYLINE);
			for line in lines {
				writer.write_pbf_key(TAG_SIMPLIFY_MASK, 2);
				writer.write_pbf_slice(&make_simplify_mask(line));
			}
			stream.write_count(lines.len());
			for line in lines {
				stream.write_points(line);
			}
		}
		FixedGeometry::Polygon(polygons) => {
			ensure!(!polygons.is_empty(), "cannot serialize empty polygon");
			writer.write_varint(TYPE_POLYGON);
			for polygon in polygons {
				writer.write_pbf_key(TAG_SIMPLIFY_MASK, 2);
				writer.write_pbf_slice(&make_simplify_mask(&polygon.outer));
				for inner in &polygon.inners {
					writer.write_pbf_key(TAG_SIMPLIFY_MASK, 2);
					writer.write_pbf_slice(&make_simplify_mask(inner));
				}
			}
			stream.write_count(polygons.len());
			for polygon in polygons {
				stream.write_points(&polygon.outer);
				stream.write_count(polygon.inners.len());
				for inner in &polygon.inners {
					stream.write_points(inner);
				}
			}
		}
	}

	writer.write_pbf_key(TAG_GEOMETRY, 2);
	writer.write_pbf_slice(stream.writer.as_slice());
	Ok(writer.into_blob())
}

/// Deserializes a fixed geometry at full detail, ignoring simplify masks.
pub fn deserialize(data: &[u8]) -> Result<FixedGeometry> {
	parse(data, None)
}

/// Deserializes a fixed geometry for zoom level `z`: every vertex whose mask
/// bit is clear at `z` is delta-decoded but skipped.
pub fn deserialize_at_zoom(data: &[u8], z: u32) -> Result<FixedGeometry> {
	parse(data, Some(z))
}

struct GeomEncoder {
	writer: ValueWriter,
	x: DeltaEncoder,
	y: DeltaEncoder,
}

impl GeomEncoder {
	fn new() -> GeomEncoder {
		GeomEncoder {
			writer: ValueWriter::new(),
			x: DeltaEncoder::new(),
			y: DeltaEncoder::new(),
		}
	}

	fn write_count(&mut self, count: usize) {
		self.writer.write_svarint(count as i64);
	}

	fn write_points(&mut self, points: &[FixedXy]) {
		self.write_count(points.len());
		for point in points {
			let dx = self.x.encode(point.x);
			let dy = self.y.encode(point.y);
			self.writer.write_svarint(dx);
			self.writer.write_svarint(dy);
		}
	}
}

struct GeomDecoder<'a> {
	reader: ValueReader<'a>,
	x: DeltaDecoder,
	y: DeltaDecoder,
	masks: Option<MaskState<'a>>,
}

struct MaskState<'a> {
	parts: Vec<&'a [u8]>,
	z: u32,
	current: usize,
}

impl<'a> GeomDecoder<'a> {
	fn new(data: &'a [u8], masks: Option<MaskState<'a>>) -> GeomDecoder<'a> {
		GeomDecoder {
			reader: ValueReader::new(data),
			x: DeltaDecoder::new(),
			y: DeltaDecoder::new(),
			masks,
		}
	}

	fn next(&mut self) -> Result<i64> {
		self.reader.read_svarint()
	}

	fn read_count(&mut self) -> Result<usize> {
		let count = self.next()?;
		ensure!(count >= 0, "negative element count");
		Ok(count as usize)
	}

	fn read_points(&mut self) -> Result<Vec<FixedXy>> {
		let count = self.read_count()?;

		if let Some(state) = &mut self.masks {
			let part = *state
				.parts
				.get(state.current)
				.context("simplify mask part missing")?;
			state.current += 1;
			let mask = SimplifyMaskReader::new(part, state.z)?;
			ensure!(mask.size() == count, "simplify mask size mismatch");

			let mut points = Vec::new();
			for i in 0..count {
				let dx = self.next()?;
				let dy = self.next()?;
				let x = self.x.decode(dx);
				let y = self.y.decode(dy);
				if mask.get_bit(i) {
					points.push(FixedXy::new(x, y));
				}
			}
			Ok(points)
		} else {
			let mut points = Vec::with_capacity(count);
			for _ in 0..count {
				let dx = self.next()?;
				let dy = self.next()?;
				points.push(FixedXy::new(self.x.decode(dx), self.y.decode(dy)));
			}
			Ok(points)
		}
	}
}

fn parse(data: &[u8], z: Option<u32>) -> Result<FixedGeometry> {
	let mut reader = ValueReader::new(data);

	ensure!(
		reader.read_pbf_key().context("empty geometry message")? == (TAG_TYPE, 0),
		"invalid geometry tag"
	);
	let geom_type = reader.read_varint()?;

	let mut mask_parts = Vec::new();
	let mut geometry: Option<&[u8]> = None;
	while reader.has_remaining() {
		match reader.read_pbf_key()? {
			(TAG_SIMPLIFY_MASK, 2) => mask_parts.push(reader.read_pbf_slice()?),
			(TAG_GEOMETRY, 2) => geometry = Some(reader.read_pbf_slice()?),
			(field, wire) => bail!("invalid geometry tag ({field}, {wire})"),
		}
	}
	let geometry = geometry.context("geometry payload missing")?;

	// points are never simplified
	let masks = match (z, geom_type) {
		(Some(z), TYPE_POLYLINE | TYPE_POLYGON) => Some(MaskState {
			parts: mask_parts,
			z,
			current: 0,
		}),
		_ => None,
	};
	let mut decoder = GeomDecoder::new(geometry, masks);

	match geom_type {
		TYPE_POINT => Ok(FixedGeometry::Point(decoder.read_points()?)),
		TYPE_POLYLINE => {
			let count = decoder.read_count()?;
			let mut lines: FixedPolyline = Vec::with_capacity(count);
			for _ in 0..count {
				let line = decoder.read_points()?;
				if line.len() >= 2 {
					lines.push(line);
				}
			}
			if lines.is_empty() {
				Ok(FixedGeometry::Null)
			} else {
				Ok(FixedGeometry::Polyline(lines))
			}
		}
		TYPE_POLYGON => {
			let count = decoder.read_count()?;
			let mut polygons: FixedPolygon = Vec::with_capacity(count);
			for _ in 0..count {
				let outer = decoder.read_points()?;
				let inner_count = decoder.read_count()?;
				let mut inners = Vec::with_capacity(inner_count);
				for _ in 0..inner_count {
					let inner = decoder.read_points()?;
					if inner.len() >= 4 {
						inners.push(inner);
					}
				}
				if outer.len() >= 4 {
					polygons.push(SimplePolygon { outer, inners });
				}
			}
			if polygons.is_empty() {
				Ok(FixedGeometry::Null)
			} else {
				Ok(FixedGeometry::Polygon(polygons))
			}
		}
		unknown => bail!("unknown geometry type {unknown}"),
	}
}
