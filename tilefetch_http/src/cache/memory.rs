//! In-memory cache bin, the default backend of the process cache.

use super::{CacheBin, CacheEntry};
use anyhow::{Result, bail};
use parking_lot::Mutex;
use std::{collections::HashMap, time::SystemTime};
use tilefetch_core::{Blob, Config};

struct StoredEntry {
	data: Blob,
	meta: Config,
	stamp: SystemTime,
}

/// A cache bin backed by a plain map.
#[derive(Default)]
pub struct MemoryCacheBin {
	entries: Mutex<HashMap<String, StoredEntry>>,
}

impl MemoryCacheBin {
	#[must_use]
	pub fn new() -> MemoryCacheBin {
		MemoryCacheBin::default()
	}
}

impl CacheBin for MemoryCacheBin {
	fn read(&self, key: &str) -> CacheEntry {
		match self.entries.lock().get(key) {
			Some(entry) => CacheEntry::hit(entry.data.clone(), entry.meta.clone(), entry.stamp),
			None => CacheEntry::miss(),
		}
	}

	fn write(&self, key: &str, data: &Blob, meta: &Config) -> Result<()> {
		self.entries.lock().insert(
			key.to_string(),
			StoredEntry {
				data: data.clone(),
				meta: meta.clone(),
				stamp: SystemTime::now(),
			},
		);
		Ok(())
	}

	fn touch(&self, key: &str) -> Result<()> {
		match self.entries.lock().get_mut(key) {
			Some(entry) => {
				entry.stamp = SystemTime::now();
				Ok(())
			}
			None => bail!("cannot touch missing cache entry \"{key}\""),
		}
	}

	fn read_metadata(&self, key: &str) -> Option<Config> {
		self.entries.lock().get(key).map(|entry| entry.meta.clone())
	}

	fn entry_count(&self) -> usize {
		self.entries.lock().len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[test]
	fn write_read_roundtrip() {
		let bin = MemoryCacheBin::new();
		assert!(!bin.read("k").is_hit());

		let mut meta = Config::new("response");
		meta.set("content-type", "image/png");
		bin.write("k", &Blob::from("data"), &meta).unwrap();

		let entry = bin.read("k");
		assert!(entry.is_hit());
		assert_eq!(entry.data.unwrap().as_str().unwrap(), "data");
		assert_eq!(entry.meta.unwrap().get("content-type"), Some("image/png"));
		assert_eq!(bin.entry_count(), 1);
	}

	#[test]
	fn touch_refreshes_stamp_without_rewriting() {
		let bin = MemoryCacheBin::new();
		bin.write("k", &Blob::from("payload"), &Config::new("response")).unwrap();
		let before = bin.read("k").stamp.unwrap();

		std::thread::sleep(Duration::from_millis(20));
		bin.touch("k").unwrap();

		let entry = bin.read("k");
		assert!(entry.stamp.unwrap() > before);
		assert_eq!(entry.data.unwrap().as_str().unwrap(), "payload");
	}

	#[test]
	fn touch_missing_fails() {
		let bin = MemoryCacheBin::new();
		assert!(bin.touch("missing").is_err());
	}

	#[test]
	fn metadata_lookup() {
		let bin = MemoryCacheBin::new();
		assert!(bin.read_metadata("k").is_none());
		let mut meta = Config::new("response");
		meta.set("etag", "abc");
		bin.write("k", &Blob::new_empty(), &meta).unwrap();
		assert_eq!(bin.read_metadata("k").unwrap().get("etag"), Some("abc"));
	}
}
