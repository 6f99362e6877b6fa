//! A thin wrapper around `Vec<u8>` used wherever the workspace passes opaque
//! byte payloads around: serialized features, feature packs, rendered tiles
//! and values read from the tile database.

use crate::ByteRange;
use anyhow::{bail, Result};
use std::fmt::Debug;

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Blob(Vec<u8>);

impl Blob {
	pub fn new_empty() -> Blob {
		Blob(Vec::new())
	}

	pub fn new_sized(length: usize) -> Blob {
		Blob(vec![0u8; length])
	}

	/// Returns the bytes of the given range as a new [`Blob`].
	pub fn read_range(&self, range: &ByteRange) -> Result<Blob> {
		if range.offset + range.length > self.0.len() as u64 {
			bail!(
				"range {range:?} exceeds blob length ({})",
				self.0.len()
			)
		}
		Ok(Blob::from(&self.0[range.as_range_usize()]))
	}

	pub fn as_slice(&self) -> &[u8] {
		self.0.as_ref()
	}

	pub fn as_mut_slice(&mut self) -> &mut [u8] {
		self.0.as_mut()
	}

	pub fn into_vec(self) -> Vec<u8> {
		self.0
	}

	pub fn len(&self) -> u64 {
		self.0.len() as u64
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Vec<u8>> for Blob {
	fn from(item: Vec<u8>) -> Self {
		Blob(item)
	}
}

impl From<&[u8]> for Blob {
	fn from(item: &[u8]) -> Self {
		Blob(item.to_vec())
	}
}

impl<const N: usize> From<&[u8; N]> for Blob {
	fn from(item: &[u8; N]) -> Self {
		Blob(item.to_vec())
	}
}

impl From<&str> for Blob {
	fn from(item: &str) -> Self {
		Blob(item.as_bytes().to_vec())
	}
}

impl From<String> for Blob {
	fn from(item: String) -> Self {
		Blob(item.into_bytes())
	}
}

impl Debug for Blob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Blob({} bytes)", self.0.len())
	}
}
