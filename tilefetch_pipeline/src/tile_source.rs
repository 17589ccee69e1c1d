//! This module provides the [`TilePipeline`]: tile keys in, typed results
//! out. It expands the URL template for a key, serializes concurrent
//! fetches of that key through the keygate and hands the request to the
//! HTTP client's read-through cache.

use crate::{keygate::Keygate, template::expand_template};
use std::sync::Arc;
use tilefetch_core::{TileKey, TileProfile, progress::Progress};
use tilefetch_http::{HttpClient, HttpRequest, ReadResult};

/// A tile-keyed HTTP source.
pub struct TilePipeline {
	template: String,
	profile: TileProfile,
	client: Arc<HttpClient>,
	keygate: Keygate,
}

impl TilePipeline {
	#[must_use]
	pub fn new(template: &str, client: Arc<HttpClient>) -> TilePipeline {
		TilePipeline {
			template: template.to_string(),
			profile: TileProfile::WebMercator,
			client,
			keygate: Keygate::new(),
		}
	}

	#[must_use]
	pub fn with_profile(mut self, profile: TileProfile) -> TilePipeline {
		self.profile = profile;
		self
	}

	/// The tiling scheme keys must use; source and cache share it.
	#[must_use]
	pub fn profile(&self) -> TileProfile {
		self.profile
	}

	/// The concrete URL for one key.
	#[must_use]
	pub fn url_for(&self, key: &TileKey) -> String {
		expand_template(&self.template, key)
	}

	/// Fetches one tile as an image. At most one transport call per key is
	/// in flight at any time; latecomers for the same key wait and are then
	/// served from the cache the first call warmed.
	pub async fn fetch_tile(&self, key: &TileKey, progress: &dyn Progress) -> ReadResult {
		let _gate = self.keygate.lock(key).await;
		let request = HttpRequest::new(self.url_for(key).as_str());
		self.client.read_image(&request, progress).await
	}

	/// Fetches one tile as text (e.g. JSON feature tiles).
	pub async fn fetch_tile_string(&self, key: &TileKey, progress: &dyn Progress) -> ReadResult {
		let _gate = self.keygate.lock(key).await;
		let request = HttpRequest::new(self.url_for(key).as_str());
		self.client.read_string(&request, progress).await
	}
}
