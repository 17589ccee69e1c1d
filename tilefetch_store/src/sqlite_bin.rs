//! SQLite-backed cache bin: the cache contract of the HTTP layer persisted
//! in one database file, with the same mutex discipline as the MBTiles
//! store.

use anyhow::{Context, Result, ensure};
use log::warn;
use parking_lot::Mutex;
use r2d2::Pool;
use r2d2_sqlite::{SqliteConnectionManager, rusqlite::params};
use std::{
	path::Path,
	time::{Duration, SystemTime, UNIX_EPOCH},
};
use tilefetch_core::{Blob, Config};
use tilefetch_http::cache::{CacheBin, CacheEntry};

/// A [`CacheBin`] stored in an SQLite file, entry timestamps in unix
/// seconds.
pub struct SqliteCacheBin {
	pool: Pool<SqliteConnectionManager>,
	io_lock: Mutex<()>,
}

impl SqliteCacheBin {
	pub fn open(path: &Path) -> Result<SqliteCacheBin> {
		let manager = SqliteConnectionManager::file(path);
		let pool = Pool::builder().max_size(10).build(manager)?;

		pool.get()?.execute_batch(
			"CREATE TABLE IF NOT EXISTS entries (key TEXT PRIMARY KEY, data BLOB, meta TEXT, stamp INTEGER);",
		)?;

		Ok(SqliteCacheBin {
			pool,
			io_lock: Mutex::new(()),
		})
	}

	fn read_row(&self, key: &str) -> Result<Option<(Vec<u8>, String, i64)>> {
		let _guard = self.io_lock.lock();
		let conn = self.pool.get()?;
		let mut stmt = conn.prepare("SELECT data, meta, stamp FROM entries WHERE key = ?1")?;
		match stmt.query_row(params![key], |row| {
			Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
		}) {
			Ok(row) => Ok(Some(row)),
			Err(r2d2_sqlite::rusqlite::Error::QueryReturnedNoRows) => Ok(None),
			Err(error) => Err(error.into()),
		}
	}
}

fn now_seconds() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|age| age.as_secs() as i64)
		.unwrap_or(0)
}

impl CacheBin for SqliteCacheBin {
	fn read(&self, key: &str) -> CacheEntry {
		match self.read_row(key) {
			Ok(Some((data, meta, stamp))) => {
				let meta = Config::from_json(&meta).unwrap_or_else(|_| Config::new("response"));
				let stamp = UNIX_EPOCH + Duration::from_secs(stamp.max(0) as u64);
				CacheEntry::hit(Blob::from(data), meta, stamp)
			}
			Ok(None) => CacheEntry::miss(),
			Err(error) => {
				warn!("cache read failed for \"{key}\": {error}");
				CacheEntry::error()
			}
		}
	}

	fn write(&self, key: &str, data: &Blob, meta: &Config) -> Result<()> {
		let _guard = self.io_lock.lock();
		self.pool.get()?.execute(
			"INSERT OR REPLACE INTO entries (key, data, meta, stamp) VALUES (?1, ?2, ?3, ?4)",
			params![key, data.as_slice(), meta.to_json_string(), now_seconds()],
		)?;
		Ok(())
	}

	fn touch(&self, key: &str) -> Result<()> {
		let _guard = self.io_lock.lock();
		let changed = self
			.pool
			.get()?
			.execute("UPDATE entries SET stamp = ?1 WHERE key = ?2", params![now_seconds(), key])
			.context("while touching a cache entry")?;
		ensure!(changed == 1, "cannot touch missing cache entry \"{key}\"");
		Ok(())
	}

	fn read_metadata(&self, key: &str) -> Option<Config> {
		let (_, meta, _) = self.read_row(key).ok()??;
		Config::from_json(&meta).ok()
	}

	fn entry_count(&self) -> usize {
		let count = || -> Result<usize> {
			let _guard = self.io_lock.lock();
			let conn = self.pool.get()?;
			Ok(conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get::<_, i64>(0))? as usize)
		};
		count().unwrap_or(0)
	}
}
