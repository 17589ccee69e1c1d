//! This module provides the [`HttpClient`] facade: one per worker, lazily
//! built, combining transport, cache policy and typed decoding.
//!
//! The read path is read-through/write-through: a fresh cache hit is served
//! without touching the network, an expired hit is revalidated with
//! `If-Modified-Since` (a 304 touches the entry instead of rewriting it),
//! and OK responses are written back to the bin.

use crate::{
	cache::{CacheBin, CachePolicy, CacheStatus, CacheUsage, cache_key, process_cache, requires_revalidation},
	decode::DecoderRegistry,
	headers::Headers,
	request::HttpRequest,
	response::{HttpResponse, Part},
	result::ReadResult,
	transport::{Transport, TransportEnv, create_transport, default_user_agent},
};
use anyhow::Result;
use log::{debug, trace};
use parking_lot::Mutex;
use std::{
	env,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::{Duration, SystemTime},
};
use tilefetch_core::{Config, ResultCode, progress::Progress};

/// Client configuration, read from the process environment once at
/// initialization and never re-read per request.
#[derive(Clone, Debug)]
pub struct ClientEnv {
	pub user_agent: String,
	pub timeout: Option<Duration>,
	pub connect_timeout: Option<Duration>,
	/// Seconds suggested to the caller's scheduler on recoverable failures.
	pub retry_delay: f64,
	/// Injected on ~10% of requests when set.
	pub simulated_code: Option<u16>,
	/// Forces a simulated 500 on every request.
	pub disabled: bool,
	pub debug: bool,
}

impl Default for ClientEnv {
	fn default() -> Self {
		ClientEnv {
			user_agent: default_user_agent(),
			timeout: None,
			connect_timeout: None,
			retry_delay: 0.0,
			simulated_code: None,
			disabled: false,
			debug: false,
		}
	}
}

fn env_seconds(name: &str) -> Option<Duration> {
	env::var(name)
		.ok()
		.and_then(|text| text.trim().parse::<u64>().ok())
		.map(Duration::from_secs)
}

impl ClientEnv {
	/// Snapshots `OSGEARTH_USERAGENT`, `OSGEARTH_HTTP_TIMEOUT`,
	/// `OSGEARTH_HTTP_CONNECTTIMEOUT`, `OSGEARTH_HTTP_RETRY_DELAY`,
	/// `OSGEARTH_SIMULATE_HTTP_RESPONSE_CODE`, `OSGEARTH_HTTP_DISABLE` and
	/// `OSGEARTH_HTTP_DEBUG`.
	#[must_use]
	pub fn from_env() -> ClientEnv {
		ClientEnv {
			user_agent: env::var("OSGEARTH_USERAGENT").unwrap_or_else(|_| default_user_agent()),
			timeout: env_seconds("OSGEARTH_HTTP_TIMEOUT"),
			connect_timeout: env_seconds("OSGEARTH_HTTP_CONNECTTIMEOUT"),
			retry_delay: env::var("OSGEARTH_HTTP_RETRY_DELAY")
				.ok()
				.and_then(|text| text.trim().parse().ok())
				.unwrap_or(0.0),
			simulated_code: env::var("OSGEARTH_SIMULATE_HTTP_RESPONSE_CODE")
				.ok()
				.and_then(|text| text.trim().parse().ok()),
			disabled: env::var("OSGEARTH_HTTP_DISABLE").is_ok(),
			debug: env::var("OSGEARTH_HTTP_DEBUG").is_ok(),
		}
	}

	fn transport_env(&self) -> TransportEnv {
		TransportEnv {
			simulated_code: self.simulated_code,
			user_agent: self.user_agent.clone(),
			timeout: self.timeout,
			connect_timeout: self.connect_timeout,
			..TransportEnv::from_env()
		}
	}
}

/// Per-worker HTTP client: transport + cache + policy + typed decoding.
pub struct HttpClient {
	transport: Arc<dyn Transport>,
	transport_env: TransportEnv,
	env: ClientEnv,
	bin: Option<Arc<dyn CacheBin>>,
	policy: CachePolicy,
	decoders: Arc<DecoderRegistry>,
}

impl HttpClient {
	/// Builds a client from the process environment, the installed
	/// transport factory and the process cache's default bin.
	pub fn new() -> Result<HttpClient> {
		HttpClient::with_env(ClientEnv::from_env())
	}

	pub fn with_env(env: ClientEnv) -> Result<HttpClient> {
		let transport_env = env.transport_env();
		Ok(HttpClient {
			transport: create_transport(&transport_env)?,
			transport_env,
			env,
			bin: Some(process_cache().default_bin()),
			policy: CachePolicy::default(),
			decoders: Arc::new(DecoderRegistry::new_default()),
		})
	}

	#[must_use]
	pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> HttpClient {
		self.transport = transport;
		self
	}

	/// Replaces the cache bin; `None` turns caching off for this client.
	#[must_use]
	pub fn with_cache_bin(mut self, bin: Option<Arc<dyn CacheBin>>) -> HttpClient {
		self.bin = bin;
		self
	}

	#[must_use]
	pub fn with_policy(mut self, policy: CachePolicy) -> HttpClient {
		self.policy = policy;
		self
	}

	#[must_use]
	pub fn with_decoders(mut self, decoders: Arc<DecoderRegistry>) -> HttpClient {
		self.decoders = decoders;
		self
	}

	/// Adds basic-auth credentials for a URL prefix.
	#[must_use]
	pub fn with_credentials(mut self, url_prefix: &str, credentials: crate::transport::Credentials) -> HttpClient {
		self.transport_env.credentials.push((url_prefix.to_string(), credentials));
		self
	}

	#[must_use]
	pub fn policy(&self) -> &CachePolicy {
		&self.policy
	}

	/// One GET with read-through caching.
	pub async fn fetch(&self, request: &HttpRequest, progress: &dyn Progress) -> HttpResponse {
		if self.env.disabled {
			let mut response = HttpResponse::new(500);
			response.message = "HTTP disabled".to_string();
			return response;
		}

		let bin = match self.policy.usage {
			CacheUsage::NoCache => None,
			CacheUsage::ReadWrite | CacheUsage::CacheOnly => self.bin.as_ref(),
		};

		let Some(bin) = bin else {
			if self.policy.usage == CacheUsage::CacheOnly {
				return HttpResponse::failed("cache-only: no cache bin configured", false);
			}
			return self.transport.fetch(request, &self.transport_env, progress).await;
		};

		let key = cache_key(&request.wire_url());
		let entry = bin.read(&key);

		match entry.status {
			CacheStatus::Hit => {
				let meta = entry.meta.unwrap_or_else(|| Config::new("response"));
				let data = entry.data.unwrap_or_default();
				let stamp = entry.stamp.unwrap_or(SystemTime::UNIX_EPOCH);

				let must_revalidate = requires_revalidation(&meta);
				let expired = must_revalidate || self.policy.is_expired(stamp);

				if !expired || self.policy.usage == CacheUsage::CacheOnly {
					trace!("cache hit for {key}");
					return synthesize_response(&meta, data, stamp);
				}

				// expired entry: revalidate upstream
				trace!("cache entry expired for {key}, revalidating");
				let mut revalidate = request.clone();
				revalidate.if_modified_since = Some(stamp);
				let response = self.transport.fetch(&revalidate, &self.transport_env, progress).await;

				if response.is_not_modified() {
					trace!("not modified, touching {key}");
					if let Err(error) = bin.touch(&key) {
						debug!("touch failed for {key}: {error}");
					}
					return synthesize_response(&meta, data, SystemTime::now());
				}
				if response.is_ok() {
					self.write_through(bin, &key, &response);
				}
				response
			}
			CacheStatus::Miss | CacheStatus::Error => {
				if self.policy.usage == CacheUsage::CacheOnly {
					return HttpResponse::failed(format!("cache-only: no entry for {key}"), false);
				}
				let response = self.transport.fetch(request, &self.transport_env, progress).await;
				if response.is_ok() {
					self.write_through(bin, &key, &response);
				}
				response
			}
		}
	}

	/// Cache writes happen only for OK (200, not canceled) responses.
	fn write_through(&self, bin: &Arc<dyn CacheBin>, key: &str, response: &HttpResponse) {
		if self.policy.usage != CacheUsage::ReadWrite {
			return;
		}
		let Some(part) = response.first_part() else {
			return;
		};
		let mut meta = part.headers.to_config("response");
		// a multipart response caches its first part under that part's type
		let cached_mime = part.mime().map(str::to_string).unwrap_or_else(|| response.mime.clone());
		if !meta.has("content-type") && !cached_mime.is_empty() {
			meta.set("content-type", &cached_mime);
		}
		if let Err(error) = bin.write(key, &part.data, &meta) {
			debug!("cache write failed for {key}: {error}");
		}
	}

	pub async fn read_image(&self, request: &HttpRequest, progress: &dyn Progress) -> ReadResult {
		self.read_typed(request, progress, Some("image")).await
	}

	pub async fn read_node(&self, request: &HttpRequest, progress: &dyn Progress) -> ReadResult {
		self.read_typed(request, progress, Some("node")).await
	}

	pub async fn read_object(&self, request: &HttpRequest, progress: &dyn Progress) -> ReadResult {
		self.read_typed(request, progress, None).await
	}

	pub async fn read_string(&self, request: &HttpRequest, progress: &dyn Progress) -> ReadResult {
		self.read_typed(request, progress, Some("text")).await
	}

	async fn read_typed(&self, request: &HttpRequest, progress: &dyn Progress, expected: Option<&str>) -> ReadResult {
		if self.env.debug {
			debug!("read {}", request.wire_url());
		}

		let response = self.fetch(request, progress).await;
		let mut result = if response.is_ok() {
			self.decode_response(request, &response)
		} else {
			let code = classify_failure(&response);
			if code.is_recoverable() {
				// surface a "retry later" signal to the caller's scheduler
				progress.set_retry_delay(self.env.retry_delay);
				progress.cancel();
			}
			let detail = if response.message.is_empty() {
				response.first_data().as_str().unwrap_or("").to_string()
			} else {
				response.message.clone()
			};
			ReadResult::failed(code, detail)
		};

		if let Some(expected) = expected {
			if let Some(content) = &result.content {
				if content.kind() != expected {
					result = ReadResult::failed(
						ResultCode::ReaderError,
						format!("decoder produced {} content, expected {expected}", content.kind()),
					);
				}
			}
		}

		result.last_modified = response.last_modified;
		result.duration = response.duration;
		result.from_cache = response.from_cache;
		result.metadata = build_metadata(request, &response);
		result
	}

	fn decode_response(&self, request: &HttpRequest, response: &HttpResponse) -> ReadResult {
		let url = request.wire_url();
		let data = response.first_data();
		let mime = response
			.first_part()
			.and_then(Part::mime)
			.unwrap_or(&response.mime);

		let Some(decoder) = self.decoders.select(data.as_slice(), &url, mime) else {
			return ReadResult::failed(ResultCode::NoReader, format!("no decoder for {url} ({mime})"));
		};

		let mut options = Config::new("options");
		options.set("url", &url);
		if let Some(referrer) = request.url().referrer() {
			options.set_referrer(referrer);
		}

		match decoder.decode(&data, &options) {
			Ok(content) => ReadResult::new(ResultCode::Ok, Some(content)),
			Err(error) => ReadResult::failed(ResultCode::ReaderError, format!("{error:#}")),
		}
	}
}

/// Rebuilds a 200 response from a cached entry.
fn synthesize_response(meta: &Config, data: tilefetch_core::Blob, stamp: SystemTime) -> HttpResponse {
	let headers = Headers::from_config(meta);
	// entries without a stored content type are served with an empty MIME
	let mime = headers.get("content-type").unwrap_or("").to_string();
	HttpResponse {
		code: 200,
		mime,
		duration: Duration::ZERO,
		last_modified: Some(stamp),
		canceled: false,
		from_cache: true,
		message: String::new(),
		parts: vec![Part::new(headers, data)],
	}
}

/// Classifies a non-OK response. Code 0 with an empty message and no
/// cancel flag is an unknown error; a timeout-bearing message wins over
/// the cancel flag.
fn classify_failure(response: &HttpResponse) -> ResultCode {
	if response.code == 0 {
		let message = response.message.to_lowercase();
		if message.contains("timed out") || message.contains("timeout") {
			ResultCode::Timeout
		} else if response.canceled {
			ResultCode::Canceled
		} else {
			ResultCode::UnknownError
		}
	} else if response.canceled {
		ResultCode::Canceled
	} else {
		ResultCode::from_status(response.code)
	}
}

fn build_metadata(request: &HttpRequest, response: &HttpResponse) -> Config {
	let mut metadata = Config::new("metadata");
	metadata.set("url", request.wire_url());
	metadata.set_number("code", f64::from(response.code));
	metadata.add_child(request.headers.to_config("request"));
	if let Some(part) = response.first_part() {
		metadata.add_child(part.headers.to_config("response"));
	} else {
		metadata.add_child(Config::new("response"));
	}
	metadata
}

/// A pool of lazily built clients; callers acquire one per operation.
pub struct ClientPool {
	clients: Mutex<Vec<Option<Arc<HttpClient>>>>,
	next: AtomicUsize,
	build: Box<dyn Fn() -> Result<HttpClient> + Send + Sync>,
}

impl ClientPool {
	#[must_use]
	pub fn new(size: usize) -> ClientPool {
		ClientPool::with_builder(size, HttpClient::new)
	}

	#[must_use]
	pub fn with_builder(size: usize, build: impl Fn() -> Result<HttpClient> + Send + Sync + 'static) -> ClientPool {
		ClientPool {
			clients: Mutex::new(vec![None; size.max(1)]),
			next: AtomicUsize::new(0),
			build: Box::new(build),
		}
	}

	/// Hands out clients round-robin, building each slot on first use.
	pub fn acquire(&self) -> Result<Arc<HttpClient>> {
		let mut clients = self.clients.lock();
		let slot = self.next.fetch_add(1, Ordering::Relaxed) % clients.len();
		if clients[slot].is_none() {
			clients[slot] = Some(Arc::new((self.build)()?));
		}
		Ok(clients[slot].clone().expect("slot was just filled"))
	}
}
