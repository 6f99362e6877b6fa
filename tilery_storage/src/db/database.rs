use super::tile_index::{subtree_range_at_zoom, TileKey};
use anyhow::{Context, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::rusqlite::params;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use tilery_core::{Blob, Tile};
use tilery_geometry::fixed::MAX_ZOOM;

pub const META_KEY_MAX_PREPARED_ZOOM: &str = "max-prepared-zoomlevel";
pub const META_KEY_FULLY_SEASIDE_TREE: &str = "fully-seaside-tree";
pub const META_KEY_LAYER_NAMES: &str = "layer-names";
pub const META_KEY_FEATURE_META_CODING: &str = "feature-meta-coding";

pub const TABLE_META: &str = "meta";
pub const TABLE_FEATURES: &str = "features";
pub const TABLE_TILES: &str = "tiles";

type SqlitePool = Pool<SqliteConnectionManager>;
type SqliteConn = PooledConnection<SqliteConnectionManager>;

/// The tile database: an embedded SQLite file with three named tables.
///
/// `meta` holds small keyed blobs, `features` maps packed tile keys to
/// feature packs, `tiles` maps packed tile keys to pre-rendered, deflated
/// vector tiles. WAL mode gives the server any number of concurrent read
/// transactions beside the single import writer. Packed tile keys stay
/// below `2^63` (zoom is capped at 20), so storing them in the `INTEGER
/// PRIMARY KEY` column keeps their ordering.
pub struct TileDatabase {
	pool: SqlitePool,
}

/// Opens (and if needed initializes) a tile database.
pub fn open_tile_database(path: &Path) -> Result<TileDatabase> {
	let manager = SqliteConnectionManager::file(path).with_init(|conn| {
		conn.pragma_update(None, "journal_mode", "WAL")?;
		conn.pragma_update(None, "synchronous", "NORMAL")
	});
	let pool = Pool::builder()
		.max_size(16)
		.build(manager)
		.with_context(|| format!("failed to open tile database {path:?}"))?;

	pool.get()?.execute_batch(
		"CREATE TABLE IF NOT EXISTS meta (name TEXT PRIMARY KEY, value BLOB NOT NULL);
		 CREATE TABLE IF NOT EXISTS features (key INTEGER PRIMARY KEY, value BLOB NOT NULL);
		 CREATE TABLE IF NOT EXISTS tiles (key INTEGER PRIMARY KEY, value BLOB NOT NULL);",
	)?;

	Ok(TileDatabase { pool })
}

/// Drops the content of all three tables.
pub fn clear_database(db: &TileDatabase) -> Result<()> {
	db.conn()?
		.execute_batch("DELETE FROM meta; DELETE FROM features; DELETE FROM tiles;")?;
	Ok(())
}

impl TileDatabase {
	fn conn(&self) -> Result<SqliteConn> {
		self.pool.get().context("tile database pool exhausted")
	}

	pub fn put_meta(&self, name: &str, value: &Blob) -> Result<()> {
		self.conn()?.execute(
			"INSERT OR REPLACE INTO meta (name, value) VALUES (?1, ?2)",
			params![name, value.as_slice()],
		)?;
		Ok(())
	}

	pub fn get_meta(&self, name: &str) -> Result<Option<Blob>> {
		let conn = self.conn()?;
		let mut stmt = conn.prepare_cached("SELECT value FROM meta WHERE name = ?1")?;
		let mut rows = stmt.query(params![name])?;
		match rows.next()? {
			Some(row) => Ok(Some(Blob::from(row.get::<_, Vec<u8>>(0)?))),
			None => Ok(None),
		}
	}

	pub fn get_value(&self, table: &'static str, key: TileKey) -> Result<Option<Vec<u8>>> {
		let conn = self.conn()?;
		let mut stmt =
			conn.prepare_cached(&format!("SELECT value FROM {table} WHERE key = ?1"))?;
		let mut rows = stmt.query(params![key as i64])?;
		match rows.next()? {
			Some(row) => Ok(Some(row.get::<_, Vec<u8>>(0)?)),
			None => Ok(None),
		}
	}

	pub fn delete_value(&self, table: &'static str, key: TileKey) -> Result<()> {
		self.conn()?.execute(
			&format!("DELETE FROM {table} WHERE key = ?1"),
			params![key as i64],
		)?;
		Ok(())
	}

	/// All keys of a table in ascending (tile sort) order.
	pub fn keys(&self, table: &'static str) -> Result<Vec<TileKey>> {
		let conn = self.conn()?;
		let mut stmt = conn.prepare_cached(&format!("SELECT key FROM {table} ORDER BY key"))?;
		let keys = stmt
			.query_map([], |row| row.get::<_, i64>(0))?
			.map(|key| Ok(key? as TileKey))
			.collect::<Result<Vec<_>>>()?;
		Ok(keys)
	}

	/// Scans the `features` table for every entry whose tile is an ancestor
	/// or descendant of `tile`, in key order. The key layout makes this one
	/// contiguous range per zoom level.
	pub fn scan_features_covering(
		&self,
		tile: &Tile,
		mut f: impl FnMut(TileKey, Vec<u8>) -> Result<()>,
	) -> Result<()> {
		let conn = self.conn()?;
		let mut stmt = conn.prepare_cached(
			"SELECT key, value FROM features WHERE key >= ?1 AND key <= ?2 ORDER BY key",
		)?;

		for z in 0..=MAX_ZOOM {
			let (lo, hi) = if z <= tile.z {
				let ancestor = tile.at_zoom(z)?;
				subtree_range_at_zoom(&ancestor, z)
			} else {
				subtree_range_at_zoom(tile, z)
			};

			let rows = stmt.query_map(params![lo as i64, hi as i64], |row| {
				Ok((row.get::<_, i64>(0)? as TileKey, row.get::<_, Vec<u8>>(1)?))
			})?;
			for row in rows {
				let (key, value) = row?;
				f(key, value)?;
			}
		}
		Ok(())
	}

	/// Whether any `features` entry exists for the tile itself.
	pub fn has_features_at(&self, tile: &Tile) -> Result<bool> {
		let (lo, hi) = subtree_range_at_zoom(tile, tile.z);
		self.range_exists(lo, hi)
	}

	/// Whether any `features` entry exists at or below the tile.
	pub fn has_features_in_subtree(&self, tile: &Tile) -> Result<bool> {
		for z in tile.z..=MAX_ZOOM {
			let (lo, hi) = subtree_range_at_zoom(tile, z);
			if self.range_exists(lo, hi)? {
				return Ok(true);
			}
		}
		Ok(false)
	}

	fn range_exists(&self, lo: TileKey, hi: TileKey) -> Result<bool> {
		let conn = self.conn()?;
		let mut stmt = conn
			.prepare_cached("SELECT 1 FROM features WHERE key >= ?1 AND key <= ?2 LIMIT 1")?;
		let mut rows = stmt.query(params![lo as i64, hi as i64])?;
		Ok(rows.next()?.is_some())
	}

	pub fn table_stats(&self, table: &'static str) -> Result<(u64, u64)> {
		let conn = self.conn()?;
		let mut stmt = conn.prepare_cached(&format!(
			"SELECT COUNT(*), COALESCE(SUM(LENGTH(value)), 0) FROM {table}"
		))?;
		let mut rows = stmt.query([])?;
		let row = rows.next()?.context("count query yielded no row")?;
		Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64))
	}

	pub fn inserter(&self, table: &'static str) -> Result<BatchInserter> {
		BatchInserter::new(self.conn()?, table)
	}
}

/// Inserts many keyed values in one transaction; commits on drop unless
/// committed explicitly.
pub struct BatchInserter {
	conn: SqliteConn,
	table: &'static str,
	open: bool,
}

impl BatchInserter {
	fn new(conn: SqliteConn, table: &'static str) -> Result<BatchInserter> {
		conn.execute_batch("BEGIN")?;
		Ok(BatchInserter {
			conn,
			table,
			open: true,
		})
	}

	pub fn insert(&mut self, key: TileKey, value: &[u8]) -> Result<()> {
		let mut stmt = self.conn.prepare_cached(&format!(
			"INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)",
			self.table
		))?;
		stmt.execute(params![key as i64, value])?;
		Ok(())
	}

	pub fn commit(mut self) -> Result<()> {
		self.open = false;
		self.conn.execute_batch("COMMIT")?;
		Ok(())
	}
}

impl Drop for BatchInserter {
	fn drop(&mut self) {
		if self.open {
			if let Err(error) = self.conn.execute_batch("COMMIT") {
				log::error!("failed to commit batch insert into {}: {error}", self.table);
			}
		}
	}
}
