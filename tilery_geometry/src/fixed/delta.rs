use super::{FixedCoord, FIXED_COORD_MAGIC_OFFSET};

/// Emits the difference to the previously encoded value.
pub struct DeltaEncoder {
	last: FixedCoord,
}

impl DeltaEncoder {
	pub fn new() -> DeltaEncoder {
		DeltaEncoder {
			last: FIXED_COORD_MAGIC_OFFSET,
		}
	}

	pub fn encode(&mut self, value: FixedCoord) -> i64 {
		let delta = value - self.last;
		self.last = value;
		delta
	}
}

impl Default for DeltaEncoder {
	fn default() -> Self {
		Self::new()
	}
}

/// Accumulates deltas back into absolute values.
pub struct DeltaDecoder {
	current: FixedCoord,
}

impl DeltaDecoder {
	pub fn new() -> DeltaDecoder {
		DeltaDecoder {
			current: FIXED_COORD_MAGIC_OFFSET,
		}
	}

	pub fn decode(&mut self, delta: i64) -> FixedCoord {
		self.current += delta;
		self.current
	}
}

impl Default for DeltaDecoder {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn roundtrip() {
		let values = [0, 42, 23, FIXED_COORD_MAGIC_OFFSET, 1 << 32, 7];
		let mut encoder = DeltaEncoder::new();
		let mut decoder = DeltaDecoder::new();
		for value in values {
			assert_eq!(decoder.decode(encoder.encode(value)), value);
		}
	}

	#[test]
	fn magic_offset_seed() {
		// a value at the plane center encodes as zero
		let mut encoder = DeltaEncoder::new();
		assert_eq!(encoder.encode(FIXED_COORD_MAGIC_OFFSET), 0);

		// and decoding a zero delta yields the plane center
		let mut decoder = DeltaDecoder::new();
		assert_eq!(decoder.decode(0), FIXED_COORD_MAGIC_OFFSET);
	}
}
