//! This module provides the [`Keygate`], which serializes concurrent work
//! on the same tile key: the first arrival proceeds, later arrivals block
//! until it finishes, then typically find the result in the cache.
//!
//! Buckets are reaped once nobody is holding or waiting on them, so the map
//! only ever holds in-flight keys.

use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tilefetch_core::TileKey;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key mutual exclusion over [`TileKey`]s.
#[derive(Default)]
pub struct Keygate {
	buckets: Mutex<HashMap<TileKey, Arc<AsyncMutex<()>>>>,
}

impl Keygate {
	#[must_use]
	pub fn new() -> Keygate {
		Keygate::default()
	}

	/// Waits until this key's bucket is free and claims it. The returned
	/// guard releases the key (and reaps its idle bucket) on drop.
	pub async fn lock(&self, key: &TileKey) -> KeygateGuard<'_> {
		let bucket = self
			.buckets
			.lock()
			.entry(*key)
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone();

		let guard = bucket.clone().lock_owned().await;
		KeygateGuard {
			gate: self,
			key: *key,
			bucket,
			guard: Some(guard),
		}
	}

	/// Number of keys currently gated (held or contended).
	#[must_use]
	pub fn bucket_count(&self) -> usize {
		self.buckets.lock().len()
	}

	fn release(&self, key: &TileKey, bucket: &Arc<AsyncMutex<()>>) {
		let mut buckets = self.buckets.lock();
		// two refs mean nobody else holds or awaits this bucket:
		// the map's and the departing guard's
		if Arc::strong_count(bucket) <= 2 {
			buckets.remove(key);
		}
	}
}

/// Holds one key of a [`Keygate`]; dropping it lets the next waiter in.
pub struct KeygateGuard<'a> {
	gate: &'a Keygate,
	key: TileKey,
	bucket: Arc<AsyncMutex<()>>,
	guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeygateGuard<'_> {
	fn drop(&mut self) {
		// unlock before deciding whether to reap, so a waiter that gets in
		// keeps the bucket alive and is counted
		self.guard.take();
		self.gate.release(&self.key, &self.bucket);
	}
}
