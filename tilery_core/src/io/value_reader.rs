use crate::Blob;
use anyhow::{bail, ensure, Context, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Reads values from a byte slice, tracking the current position.
pub struct ValueReader<'a> {
	data: &'a [u8],
	pos: usize,
}

impl<'a> ValueReader<'a> {
	pub fn new(data: &'a [u8]) -> ValueReader<'a> {
		ValueReader { data, pos: 0 }
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	pub fn position(&self) -> usize {
		self.pos
	}

	pub fn set_position(&mut self, position: usize) -> Result<()> {
		ensure!(position <= self.data.len(), "position {position} out of bounds");
		self.pos = position;
		Ok(())
	}

	pub fn remaining(&self) -> usize {
		self.data.len() - self.pos
	}

	pub fn has_remaining(&self) -> bool {
		self.remaining() > 0
	}

	fn take(&mut self, n: usize) -> Result<&'a [u8]> {
		ensure!(self.remaining() >= n, "unexpected end of input");
		let slice = &self.data[self.pos..self.pos + n];
		self.pos += n;
		Ok(slice)
	}

	pub fn read_u8(&mut self) -> Result<u8> {
		Ok(self.take(1)?[0])
	}

	pub fn read_u32(&mut self) -> Result<u32> {
		Ok(LittleEndian::read_u32(self.take(4)?))
	}

	pub fn read_u64(&mut self) -> Result<u64> {
		Ok(LittleEndian::read_u64(self.take(8)?))
	}

	pub fn read_f64(&mut self) -> Result<f64> {
		Ok(LittleEndian::read_f64(self.take(8)?))
	}

	/// Reads an unsigned LEB128 varint.
	pub fn read_varint(&mut self) -> Result<u64> {
		let mut value = 0u64;
		let mut shift = 0;
		loop {
			let byte = self.read_u8().context("truncated varint")?;
			value |= (u64::from(byte) & 0x7F) << shift;
			if byte & 0x80 == 0 {
				break;
			}
			shift += 7;
			if shift >= 70 {
				bail!("varint too long");
			}
		}
		Ok(value)
	}

	/// Reads a zig-zag encoded signed varint.
	pub fn read_svarint(&mut self) -> Result<i64> {
		let value = self.read_varint()?;
		Ok(((value >> 1) as i64) ^ -((value & 1) as i64))
	}

	pub fn read_slice(&mut self, length: usize) -> Result<&'a [u8]> {
		self.take(length)
	}

	pub fn read_blob(&mut self, length: usize) -> Result<Blob> {
		Ok(Blob::from(self.take(length)?))
	}

	pub fn read_string(&mut self, length: usize) -> Result<String> {
		Ok(String::from_utf8(self.take(length)?.to_vec())?)
	}

	/// Reads a protobuf key, returning `(field_number, wire_type)`.
	pub fn read_pbf_key(&mut self) -> Result<(u32, u8)> {
		let value = self.read_varint().context("failed to read PBF key")?;
		Ok(((value >> 3) as u32, (value & 0x07) as u8))
	}

	pub fn read_pbf_string(&mut self) -> Result<String> {
		let length = self.read_varint()?;
		self.read_string(length as usize)
	}

	pub fn read_pbf_slice(&mut self) -> Result<&'a [u8]> {
		let length = self.read_varint()?;
		self.read_slice(length as usize)
	}

	/// Returns a sub-reader over the next `length` bytes and skips them.
	pub fn sub_reader(&mut self, length: usize) -> Result<ValueReader<'a>> {
		Ok(ValueReader::new(self.take(length)?))
	}

	/// Returns a sub-reader for a length-prefixed protobuf message.
	pub fn pbf_sub_reader(&mut self) -> Result<ValueReader<'a>> {
		let length = self.read_varint().context("failed to read message length")?;
		self.sub_reader(length as usize)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fixed_width() -> Result<()> {
		let mut reader = ValueReader::new(&[0x01, 0x02, 0x03, 0x04, 0xFF]);
		assert_eq!(reader.read_u32()?, 0x04030201);
		assert_eq!(reader.read_u8()?, 0xFF);
		assert!(!reader.has_remaining());
		assert!(reader.read_u8().is_err());
		Ok(())
	}

	#[test]
	fn varint() -> Result<()> {
		let mut reader = ValueReader::new(&[0xAC, 0x02]);
		assert_eq!(reader.read_varint()?, 300);
		Ok(())
	}

	#[test]
	fn varint_truncated() {
		let mut reader = ValueReader::new(&[0x80]);
		assert!(reader.read_varint().is_err());
	}

	#[test]
	fn svarint() -> Result<()> {
		assert_eq!(ValueReader::new(&[0x96, 0x01]).read_svarint()?, 75);
		assert_eq!(ValueReader::new(&[0x95, 0x01]).read_svarint()?, -75);
		Ok(())
	}

	#[test]
	fn pbf_key_and_string() -> Result<()> {
		let mut reader = ValueReader::new(&[0x0A, 0x05, b'h', b'e', b'l', b'l', b'o']);
		assert_eq!(reader.read_pbf_key()?, (1, 2));
		assert_eq!(reader.read_pbf_string()?, "hello");
		Ok(())
	}

	#[test]
	fn sub_reader_window() -> Result<()> {
		let mut reader = ValueReader::new(&[0x02, 0x64, 0x65, 0x66]);
		let mut sub = reader.pbf_sub_reader()?;
		assert_eq!(sub.read_u8()?, 0x64);
		assert_eq!(sub.read_u8()?, 0x65);
		assert!(!sub.has_remaining());
		assert_eq!(reader.read_u8()?, 0x66);
		Ok(())
	}
}
