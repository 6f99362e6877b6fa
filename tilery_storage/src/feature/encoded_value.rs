use anyhow::{bail, Result};
use tilery_core::io::{ValueReader, ValueWriter};

const TAG_BOOL_FALSE: u8 = 0;
const TAG_BOOL_TRUE: u8 = 1;
const TAG_STRING: u8 = 2;
const TAG_INTEGER: u8 = 3;
const TAG_NUMERIC: u8 = 4;

/// A typed metadata value in its storable form.
#[derive(Clone, Debug, PartialEq)]
pub enum EncodedValue {
	Bool(bool),
	String(String),
	Integer(i64),
	Numeric(f64),
}

impl EncodedValue {
	pub fn to_bytes(&self) -> Vec<u8> {
		let mut writer = ValueWriter::new();
		match self {
			EncodedValue::Bool(value) => {
				writer.write_u8(if *value { TAG_BOOL_TRUE } else { TAG_BOOL_FALSE });
			}
			EncodedValue::String(value) => {
				writer.write_u8(TAG_STRING);
				writer.write_pbf_string(value);
			}
			EncodedValue::Integer(value) => {
				writer.write_u8(TAG_INTEGER);
				writer.write_svarint(*value);
			}
			EncodedValue::Numeric(value) => {
				writer.write_u8(TAG_NUMERIC);
				writer.write_f64(*value);
			}
		}
		writer.into_vec()
	}

	pub fn from_bytes(data: &[u8]) -> Result<EncodedValue> {
		let mut reader = ValueReader::new(data);
		let value = match reader.read_u8()? {
			TAG_BOOL_FALSE => EncodedValue::Bool(false),
			TAG_BOOL_TRUE => EncodedValue::Bool(true),
			TAG_STRING => EncodedValue::String(reader.read_pbf_string()?),
			TAG_INTEGER => EncodedValue::Integer(reader.read_svarint()?),
			TAG_NUMERIC => EncodedValue::Numeric(reader.read_f64()?),
			tag => bail!("unknown metadata value tag {tag}"),
		};
		Ok(value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn roundtrip() -> Result<()> {
		for value in [
			EncodedValue::Bool(false),
			EncodedValue::Bool(true),
			EncodedValue::String("Hauptstraße".to_string()),
			EncodedValue::String(String::new()),
			EncodedValue::Integer(-12345),
			EncodedValue::Numeric(47.11),
		] {
			assert_eq!(EncodedValue::from_bytes(&value.to_bytes())?, value);
		}
		Ok(())
	}

	#[test]
	fn invalid_input_fails() {
		assert!(EncodedValue::from_bytes(&[]).is_err());
		assert!(EncodedValue::from_bytes(&[9]).is_err());
		assert!(EncodedValue::from_bytes(&[TAG_STRING, 5, b'a']).is_err());
	}
}
