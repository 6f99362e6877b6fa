use crate::Blob;
use anyhow::{Context, Result};
use flate2::read::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use std::io::Read;

/// Compresses data using deflate (zlib framing, as served with
/// `Content-Encoding: deflate`).
pub fn compress_deflate(blob: &Blob) -> Result<Blob> {
	let mut encoder = ZlibEncoder::new(blob.as_slice(), Compression::default());
	let mut result = Vec::new();
	encoder
		.read_to_end(&mut result)
		.context("failed to compress data")?;
	Ok(Blob::from(result))
}

/// Decompresses deflate (zlib framed) data.
pub fn decompress_deflate(blob: &Blob) -> Result<Blob> {
	let mut decoder = ZlibDecoder::new(blob.as_slice());
	let mut result = Vec::new();
	decoder
		.read_to_end(&mut result)
		.context("failed to decompress data")?;
	Ok(Blob::from(result))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn roundtrip() -> Result<()> {
		let data = Blob::from("the quick brown fox jumps over the lazy dog, twice over");
		let compressed = compress_deflate(&data)?;
		assert!(!compressed.is_empty());
		assert_eq!(decompress_deflate(&compressed)?, data);
		Ok(())
	}

	#[test]
	fn incompressible_input() -> Result<()> {
		// pseudo random bytes still come back intact
		let mut data = vec![0u8; 4096];
		let mut state = 0x2545F491u32;
		for byte in &mut data {
			state = state.wrapping_mul(747796405).wrapping_add(2891336453);
			*byte = (state >> 24) as u8;
		}
		let blob = Blob::from(data);
		let compressed = compress_deflate(&blob)?;
		assert!(!compressed.is_empty());
		assert_eq!(decompress_deflate(&compressed)?, blob);
		Ok(())
	}

	#[test]
	fn garbage_fails() {
		assert!(decompress_deflate(&Blob::from(&[1, 2, 3, 4])).is_err());
	}
}
