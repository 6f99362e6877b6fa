use tilery_core::io::ValueWriter;
use tilery_core::Blob;

/// A property value of a vector tile feature, per the `Value` message of the
/// MVT schema.
#[derive(Clone, Debug, PartialEq)]
pub enum MvtValue {
	String(String),
	Double(f64),
	Int(i64),
	Bool(bool),
}

impl MvtValue {
	pub fn to_blob(&self) -> Blob {
		let mut writer = ValueWriter::new();
		match self {
			MvtValue::String(value) => {
				writer.write_pbf_key(1, 2);
				writer.write_pbf_string(value);
			}
			MvtValue::Double(value) => {
				writer.write_pbf_key(3, 1);
				writer.write_f64(*value);
			}
			MvtValue::Int(value) => {
				writer.write_pbf_key(4, 0);
				writer.write_varint(*value as u64);
			}
			MvtValue::Bool(value) => {
				writer.write_pbf_key(7, 0);
				writer.write_varint(u64::from(*value));
			}
		}
		writer.into_blob()
	}
}
