use crate::Blob;
use byteorder::{ByteOrder, LittleEndian};

/// Writes values into a growable byte buffer.
///
/// Writes are infallible; the buffer grows as needed.
#[derive(Default)]
pub struct ValueWriter {
	data: Vec<u8>,
}

impl ValueWriter {
	pub fn new() -> ValueWriter {
		ValueWriter { data: Vec::new() }
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	pub fn write_u8(&mut self, value: u8) {
		self.data.push(value);
	}

	pub fn write_u32(&mut self, value: u32) {
		let mut buf = [0u8; 4];
		LittleEndian::write_u32(&mut buf, value);
		self.data.extend_from_slice(&buf);
	}

	pub fn write_u64(&mut self, value: u64) {
		let mut buf = [0u8; 8];
		LittleEndian::write_u64(&mut buf, value);
		self.data.extend_from_slice(&buf);
	}

	pub fn write_f64(&mut self, value: f64) {
		let mut buf = [0u8; 8];
		LittleEndian::write_f64(&mut buf, value);
		self.data.extend_from_slice(&buf);
	}

	pub fn write_varint(&mut self, mut value: u64) {
		while value >= 0x80 {
			self.data.push((value as u8) | 0x80);
			value >>= 7;
		}
		self.data.push(value as u8);
	}

	pub fn write_svarint(&mut self, value: i64) {
		self.write_varint(((value << 1) ^ (value >> 63)) as u64);
	}

	pub fn write_slice(&mut self, buf: &[u8]) {
		self.data.extend_from_slice(buf);
	}

	pub fn write_pbf_key(&mut self, field_number: u32, wire_type: u8) {
		self.write_varint((u64::from(field_number) << 3) | u64::from(wire_type));
	}

	pub fn write_pbf_string(&mut self, text: &str) {
		self.write_varint(text.len() as u64);
		self.data.extend_from_slice(text.as_bytes());
	}

	pub fn write_pbf_slice(&mut self, buf: &[u8]) {
		self.write_varint(buf.len() as u64);
		self.data.extend_from_slice(buf);
	}

	pub fn write_pbf_packed_u32(&mut self, values: &[u32]) {
		let mut packed = ValueWriter::new();
		for value in values {
			packed.write_varint(u64::from(*value));
		}
		self.write_pbf_slice(&packed.data);
	}

	pub fn as_slice(&self) -> &[u8] {
		&self.data
	}

	pub fn into_vec(self) -> Vec<u8> {
		self.data
	}

	pub fn into_blob(self) -> Blob {
		Blob::from(self.data)
	}
}
