pub mod benchmark;
pub mod import;
pub mod serve;

use anyhow::Result;
use std::path::{Path, PathBuf};
use tilery_storage::db::PackHandle;

/// The pack file lives next to the database file.
pub fn pack_path(db_path: &Path) -> PathBuf {
	let mut path = db_path.as_os_str().to_owned();
	path.push(".pack");
	PathBuf::from(path)
}

pub fn open_pack(db_path: &Path) -> Result<PackHandle> {
	PackHandle::open(&pack_path(db_path))
}
