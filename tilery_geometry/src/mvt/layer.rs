use super::MvtValue;
use crate::fixed::{FixedGeometry, FixedXy};
use crate::TileSpec;
use anyhow::{ensure, Result};
use std::collections::HashMap;
use tilery_core::io::ValueWriter;
use tilery_core::Blob;

const EXTENT: u32 = 4096;

const GEOM_TYPE_POINT: u64 = 1;
const GEOM_TYPE_LINESTRING: u64 = 2;
const GEOM_TYPE_POLYGON: u64 = 3;

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

/// One layer of a vector tile, deduplicating property keys and values into
/// the layer-level string tables while features are added.
pub struct MvtLayer {
	name: String,
	keys: Vec<String>,
	key_lookup: HashMap<String, u32>,
	values: Vec<Blob>,
	value_lookup: HashMap<Vec<u8>, u32>,
	features: Vec<Blob>,
}

impl MvtLayer {
	pub fn new(name: &str) -> MvtLayer {
		MvtLayer {
			name: name.to_string(),
			keys: Vec::new(),
			key_lookup: HashMap::new(),
			values: Vec::new(),
			value_lookup: HashMap::new(),
			features: Vec::new(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.features.is_empty()
	}

	/// Encodes a feature into the layer. The geometry is localized to the
	/// tile's `[0, 4096]^2` coordinate space; vertices in the overdraw
	/// margin fall outside that range, which the format allows.
	pub fn add_feature(
		&mut self,
		id: u64,
		spec: &TileSpec,
		geometry: &FixedGeometry,
		properties: &[(String, MvtValue)],
	) -> Result<()> {
		let (geom_type, commands) = encode_geometry(geometry, spec)?;

		let mut tags = Vec::with_capacity(properties.len() * 2);
		for (key, value) in properties {
			tags.push(self.key_id(key));
			tags.push(self.value_id(value));
		}

		let mut writer = ValueWriter::new();
		writer.write_pbf_key(1, 0);
		writer.write_varint(id);
		if !tags.is_empty() {
			writer.write_pbf_key(2, 2);
			writer.write_pbf_packed_u32(&tags);
		}
		writer.write_pbf_key(3, 0);
		writer.write_varint(geom_type);
		writer.write_pbf_key(4, 2);
		writer.write_pbf_packed_u32(&commands);

		self.features.push(writer.into_blob());
		Ok(())
	}

	fn key_id(&mut self, key: &str) -> u32 {
		if let Some(id) = self.key_lookup.get(key) {
			return *id;
		}
		let id = self.keys.len() as u32;
		self.keys.push(key.to_string());
		self.key_lookup.insert(key.to_string(), id);
		id
	}

	fn value_id(&mut self, value: &MvtValue) -> u32 {
		let blob = value.to_blob();
		if let Some(id) = self.value_lookup.get(blob.as_slice()) {
			return *id;
		}
		let id = self.values.len() as u32;
		self.value_lookup.insert(blob.as_slice().to_vec(), id);
		self.values.push(blob);
		id
	}

	pub fn to_blob(&self) -> Blob {
		let mut writer = ValueWriter::new();
		writer.write_pbf_key(1, 2);
		writer.write_pbf_string(&self.name);
		for feature in &self.features {
			writer.write_pbf_key(2, 2);
			writer.write_pbf_slice(feature.as_slice());
		}
		for key in &self.keys {
			writer.write_pbf_key(3, 2);
			writer.write_pbf_string(key);
		}
		for value in &self.values {
			writer.write_pbf_key(4, 2);
			writer.write_pbf_slice(value.as_slice());
		}
		writer.write_pbf_key(5, 0);
		writer.write_varint(u64::from(EXTENT));
		writer.write_pbf_key(15, 0);
		writer.write_varint(2);
		writer.into_blob()
	}
}

struct CommandEncoder {
	commands: Vec<u32>,
	cursor: (i64, i64),
}

impl CommandEncoder {
	fn new() -> CommandEncoder {
		CommandEncoder {
			commands: Vec::new(),
			cursor: (0, 0),
		}
	}

	fn command(&mut self, id: u32, count: u32) {
		self.commands.push((count << 3) | id);
	}

	fn param(&mut self, value: i64) {
		let value = value as i32;
		self.commands.push(((value << 1) ^ (value >> 31)) as u32);
	}

	fn push(&mut self, p: (i64, i64)) {
		self.param(p.0 - self.cursor.0);
		self.param(p.1 - self.cursor.1);
		self.cursor = p;
	}
}

fn localize(p: &FixedXy, spec: &TileSpec) -> (i64, i64) {
	(
		(p.x - spec.bounds.min.x) >> spec.delta_z,
		(p.y - spec.bounds.min.y) >> spec.delta_z,
	)
}

/// The surveyor's formula over localized ring coordinates; per MVT 2.1 an
/// exterior ring has positive area in this frame.
fn ring_area(ring: &[(i64, i64)]) -> i64 {
	let mut doubled = 0i64;
	for i in 0..ring.len() {
		let (ax, ay) = ring[i];
		let (bx, by) = ring[(i + 1) % ring.len()];
		doubled += ax * by - bx * ay;
	}
	doubled / 2
}

fn encode_geometry(geometry: &FixedGeometry, spec: &TileSpec) -> Result<(u64, Vec<u32>)> {
	let mut encoder = CommandEncoder::new();

	let geom_type = match geometry {
		FixedGeometry::Null => anyhow::bail!("cannot encode null geometry"),
		FixedGeometry::Point(points) => {
			ensure!(!points.is_empty(), "empty multi-point");
			encoder.command(CMD_MOVE_TO, points.len() as u32);
			for point in points {
				encoder.push(localize(point, spec));
			}
			GEOM_TYPE_POINT
		}
		FixedGeometry::Polyline(lines) => {
			ensure!(!lines.is_empty(), "empty polyline");
			for line in lines {
				ensure!(line.len() >= 2, "polyline part with fewer than two vertices");
				encoder.command(CMD_MOVE_TO, 1);
				encoder.push(localize(&line[0], spec));
				encoder.command(CMD_LINE_TO, (line.len() - 1) as u32);
				for point in &line[1..] {
					encoder.push(localize(point, spec));
				}
			}
			GEOM_TYPE_LINESTRING
		}
		FixedGeometry::Polygon(polygons) => {
			ensure!(!polygons.is_empty(), "empty polygon");
			for polygon in polygons {
				encode_ring(&mut encoder, &polygon.outer, spec, true)?;
				for inner in &polygon.inners {
					encode_ring(&mut encoder, inner, spec, false)?;
				}
			}
			GEOM_TYPE_POLYGON
		}
	};
	Ok((geom_type, encoder.commands))
}

fn encode_ring(
	encoder: &mut CommandEncoder,
	ring: &[FixedXy],
	spec: &TileSpec,
	is_outer: bool,
) -> Result<()> {
	ensure!(ring.len() >= 4, "degenerate polygon ring");

	// drop the closing vertex, ClosePath replaces it
	let mut localized: Vec<(i64, i64)> = ring[..ring.len() - 1]
		.iter()
		.map(|p| localize(p, spec))
		.collect();

	// clipping may leave rings with either orientation
	let area = ring_area(&localized);
	if (is_outer && area < 0) || (!is_outer && area > 0) {
		localized.reverse();
	}

	encoder.command(CMD_MOVE_TO, 1);
	encoder.push(localized[0]);
	encoder.command(CMD_LINE_TO, (localized.len() - 1) as u32);
	for point in &localized[1..] {
		encoder.push(*point);
	}
	encoder.command(CMD_CLOSE_PATH, 1);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fixed::SimplePolygon;
	use tilery_core::Tile;

	fn spec() -> TileSpec {
		TileSpec::new(Tile::new(0, 0, 20)).unwrap()
	}

	#[test]
	fn point_commands() -> Result<()> {
		let (geom_type, commands) = encode_geometry(
			&FixedGeometry::Point(vec![FixedXy::new(25, 17)]),
			&spec(),
		)?;
		assert_eq!(geom_type, GEOM_TYPE_POINT);
		assert_eq!(commands, vec![(1 << 3) | 1, 50, 34]);
		Ok(())
	}

	#[test]
	fn linestring_commands() -> Result<()> {
		let line = FixedGeometry::Polyline(vec![vec![
			FixedXy::new(2, 2),
			FixedXy::new(2, 10),
			FixedXy::new(10, 10),
		]]);
		let (geom_type, commands) = encode_geometry(&line, &spec())?;
		assert_eq!(geom_type, GEOM_TYPE_LINESTRING);
		assert_eq!(
			commands,
			vec![
				(1 << 3) | CMD_MOVE_TO,
				4,
				4,
				(2 << 3) | CMD_LINE_TO,
				0,
				16,
				16,
				0
			]
		);
		Ok(())
	}

	#[test]
	fn polygon_winding_is_fixed() -> Result<()> {
		// ring given counter-clockwise in tile coordinates (negative area)
		let ring = vec![
			FixedXy::new(0, 0),
			FixedXy::new(0, 10),
			FixedXy::new(10, 10),
			FixedXy::new(10, 0),
			FixedXy::new(0, 0),
		];
		assert!(ring_area(&ring.iter().map(|p| (p.x, p.y)).collect::<Vec<_>>()) < 0);

		let polygon = FixedGeometry::Polygon(vec![SimplePolygon {
			outer: ring,
			inners: vec![],
		}]);
		let (geom_type, commands) = encode_geometry(&polygon, &spec())?;
		assert_eq!(geom_type, GEOM_TYPE_POLYGON);
		assert_eq!(commands[0], (1 << 3) | CMD_MOVE_TO);
		assert_eq!(*commands.last().unwrap(), (1 << 3) | CMD_CLOSE_PATH);

		// decode the emitted ring and check it ended up clockwise
		let mut decoded = Vec::new();
		let mut cursor = (0i64, 0i64);
		let mut i = 0;
		while i < commands.len() {
			let command = commands[i] & 0x7;
			let count = commands[i] >> 3;
			i += 1;
			if command == CMD_CLOSE_PATH {
				continue;
			}
			for _ in 0..count {
				let dx = ((commands[i] >> 1) as i32 ^ -((commands[i] & 1) as i32)) as i64;
				let dy = ((commands[i + 1] >> 1) as i32 ^ -((commands[i + 1] & 1) as i32)) as i64;
				cursor = (cursor.0 + dx, cursor.1 + dy);
				decoded.push(cursor);
				i += 2;
			}
		}
		assert!(ring_area(&decoded) > 0);
		Ok(())
	}

	#[test]
	fn property_tables_deduplicate() -> Result<()> {
		let mut layer = MvtLayer::new("poi");
		let point = FixedGeometry::Point(vec![FixedXy::new(1, 1)]);
		layer.add_feature(
			1,
			&spec(),
			&point,
			&[
				("kind".to_string(), MvtValue::String("bakery".to_string())),
				("floors".to_string(), MvtValue::Int(2)),
			],
		)?;
		layer.add_feature(
			2,
			&spec(),
			&point,
			&[("kind".to_string(), MvtValue::String("bakery".to_string()))],
		)?;

		assert_eq!(layer.keys, vec!["kind", "floors"]);
		assert_eq!(layer.values.len(), 2);
		assert_eq!(layer.features.len(), 2);
		Ok(())
	}

	#[test]
	fn localization_shifts_by_delta_z() -> Result<()> {
		let spec = TileSpec::new(Tile::new(1, 0, 1))?;
		// center of tile (1, 0, 1) in the fixed plane
		let p = FixedXy::new(3 << 30, 1 << 30);
		assert_eq!(localize(&p, &spec), (2048, 2048));
		Ok(())
	}
}
