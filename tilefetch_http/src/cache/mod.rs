//! Read/write/touch cache keyed by a canonical URL fingerprint.
//!
//! A [`CacheBin`] is a named scope inside the process [`Cache`]; every bin
//! stores blobs with a metadata Config (the response headers) and an entry
//! timestamp. The default bin is shared by all URL content, deliberately,
//! so multiple logical layers hit one physical cache.

pub mod disk;
pub use disk::DiskCacheBin;
pub mod memory;
pub use memory::MemoryCacheBin;

use anyhow::Result;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use std::{
	collections::HashMap,
	sync::Arc,
	time::{Duration, SystemTime},
};
use tilefetch_core::{Blob, Config};

/// Spaces are the one URL character that breaks downstream key handling.
const KEY_ENCODE_SET: &AsciiSet = &CONTROLS.add(b' ');

/// Canonical cache key for a wire URL: trimmed, spaces percent-encoded.
#[must_use]
pub fn cache_key(url: &str) -> String {
	utf8_percent_encode(url.trim(), KEY_ENCODE_SET).to_string()
}

/// Outcome of a bin lookup.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CacheStatus {
	Hit,
	Miss,
	Error,
}

/// A bin lookup result: status plus blob, metadata and entry timestamp on a
/// hit.
#[derive(Debug)]
pub struct CacheEntry {
	pub status: CacheStatus,
	pub data: Option<Blob>,
	pub meta: Option<Config>,
	pub stamp: Option<SystemTime>,
}

impl CacheEntry {
	#[must_use]
	pub fn hit(data: Blob, meta: Config, stamp: SystemTime) -> CacheEntry {
		CacheEntry {
			status: CacheStatus::Hit,
			data: Some(data),
			meta: Some(meta),
			stamp: Some(stamp),
		}
	}

	#[must_use]
	pub fn miss() -> CacheEntry {
		CacheEntry {
			status: CacheStatus::Miss,
			data: None,
			meta: None,
			stamp: None,
		}
	}

	#[must_use]
	pub fn error() -> CacheEntry {
		CacheEntry {
			status: CacheStatus::Error,
			data: None,
			meta: None,
			stamp: None,
		}
	}

	#[must_use]
	pub fn is_hit(&self) -> bool {
		self.status == CacheStatus::Hit
	}
}

/// Blocking, thread-safe blob store with per-entry metadata.
pub trait CacheBin: Send + Sync {
	fn read(&self, key: &str) -> CacheEntry;
	fn write(&self, key: &str, data: &Blob, meta: &Config) -> Result<()>;
	/// Refreshes only the entry timestamp, keeping the payload.
	fn touch(&self, key: &str) -> Result<()>;
	fn read_metadata(&self, key: &str) -> Option<Config>;
	fn entry_count(&self) -> usize;
}

/// How a client is allowed to use the cache.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CacheUsage {
	/// Read hits, write fresh responses.
	#[default]
	ReadWrite,
	/// Never touch the network; serve what the cache has.
	CacheOnly,
	/// Bypass the cache entirely.
	NoCache,
}

/// Expiry policy applied at lookup time.
#[derive(Copy, Clone, Debug)]
pub struct CachePolicy {
	pub usage: CacheUsage,
	pub max_age: Duration,
	pub force_expire: bool,
}

impl Default for CachePolicy {
	fn default() -> Self {
		CachePolicy {
			usage: CacheUsage::ReadWrite,
			max_age: Duration::from_secs(60 * 60 * 24 * 365),
			force_expire: false,
		}
	}
}

impl CachePolicy {
	#[must_use]
	pub fn with_max_age(max_age: Duration) -> CachePolicy {
		CachePolicy {
			max_age,
			..Default::default()
		}
	}

	/// An entry is expired once it is older than `max_age`, or always when
	/// `force_expire` is set.
	#[must_use]
	pub fn is_expired(&self, stamp: SystemTime) -> bool {
		if self.force_expire {
			return true;
		}
		match SystemTime::now().duration_since(stamp) {
			Ok(age) => age > self.max_age,
			Err(_) => false,
		}
	}
}

/// True when the stored metadata demands revalidation on every read
/// (a `cache-control` header containing `no-cache`).
#[must_use]
pub fn requires_revalidation(meta: &Config) -> bool {
	meta
		.find("cache-control", true)
		.and_then(|child| child.value())
		.is_some_and(|value| value.contains("no-cache"))
}

/// The process cache: named bins plus a shared default bin.
pub struct Cache {
	bins: Mutex<HashMap<String, Arc<dyn CacheBin>>>,
	default_bin: Mutex<Arc<dyn CacheBin>>,
}

impl Cache {
	/// A cache whose default bin lives in memory.
	#[must_use]
	pub fn new_memory() -> Cache {
		Cache {
			bins: Mutex::new(HashMap::new()),
			default_bin: Mutex::new(Arc::new(MemoryCacheBin::new())),
		}
	}

	#[must_use]
	pub fn bin(&self, name: &str) -> Option<Arc<dyn CacheBin>> {
		self.bins.lock().get(name).cloned()
	}

	pub fn add_bin(&self, name: &str, bin: Arc<dyn CacheBin>) {
		self.bins.lock().insert(name.to_string(), bin);
	}

	/// The bin used for all URL content unless a caller picks a named one.
	#[must_use]
	pub fn default_bin(&self) -> Arc<dyn CacheBin> {
		self.default_bin.lock().clone()
	}

	pub fn set_default_bin(&self, bin: Arc<dyn CacheBin>) {
		*self.default_bin.lock() = bin;
	}
}

lazy_static! {
	static ref PROCESS_CACHE: Cache = Cache::new_memory();
}

/// The process-wide cache singleton.
#[must_use]
pub fn process_cache() -> &'static Cache {
	&PROCESS_CACHE
}
