//! End-to-end tests of the fetch pipeline: typed reads, cache coherence,
//! multipart handling, cancellation and per-key single-flight.

use anyhow::Result;
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
use tilefetch::{
	core::{
		Blob, Config, ResultCode, TileKey, TileProfile,
		progress::{NoProgress, Progress, ProgressState},
	},
	http::{
		HttpClient, HttpRequest, HttpResponse,
		cache::{CacheBin, CachePolicy, MemoryCacheBin, cache_key},
		client::ClientEnv,
		decode::{Decoded, Decoder, DecoderRegistry},
		multipart::parse_multipart,
		transport::mock::MockTransport,
	},
	pipeline::TilePipeline,
};

const PNG_MAGIC: [u8; 4] = [0x89, 0x50, 0x4e, 0x47];

fn init_logging() {
	let _ = env_logger::builder().is_test(true).try_init();
}

/// Accepts anything with the PNG signature and yields a fixed 1×1 image,
/// so the pipeline can be exercised without real image payloads.
struct StubPngDecoder;

impl Decoder for StubPngDecoder {
	fn name(&self) -> &str {
		"stub-png"
	}

	fn sniff(&self, data: &[u8]) -> bool {
		data.starts_with(&PNG_MAGIC)
	}

	fn mime_types(&self) -> &[&str] {
		&["image/png"]
	}

	fn decode(&self, _data: &Blob, _options: &Config) -> Result<Decoded> {
		Ok(Decoded::Image(image::DynamicImage::new_rgba8(1, 1)))
	}
}

fn stub_registry() -> Arc<DecoderRegistry> {
	let mut registry = DecoderRegistry::new_empty();
	registry.register(Arc::new(StubPngDecoder));
	Arc::new(registry)
}

fn client_with(transport: Arc<MockTransport>, bin: Option<Arc<dyn CacheBin>>) -> HttpClient {
	HttpClient::with_env(ClientEnv::default())
		.unwrap()
		.with_transport(transport)
		.with_cache_bin(bin)
		.with_decoders(stub_registry())
		.with_policy(CachePolicy::with_max_age(Duration::from_secs(60)))
}

#[tokio::test]
async fn simple_get_ok() {
	init_logging();
	let transport = Arc::new(MockTransport::new());
	transport.respond_with("http://ex/a.png", MockTransport::ok_response("image/png", &PNG_MAGIC));

	let client = client_with(transport.clone(), Some(Arc::new(MemoryCacheBin::new())));
	let result = client.read_image(&HttpRequest::new("http://ex/a.png"), &NoProgress).await;

	assert_eq!(result.code, ResultCode::Ok);
	assert!(result.image().is_some());
	assert!(!result.from_cache);
	assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn warm_cache_serves_second_read() {
	let transport = Arc::new(MockTransport::new());
	transport.respond_with("http://ex/a.png", MockTransport::ok_response("image/png", &PNG_MAGIC));

	let client = client_with(transport.clone(), Some(Arc::new(MemoryCacheBin::new())));
	let request = HttpRequest::new("http://ex/a.png");

	let first = client.read_image(&request, &NoProgress).await;
	assert_eq!(first.code, ResultCode::Ok);
	assert!(!first.from_cache);

	let second = client.read_image(&request, &NoProgress).await;
	assert_eq!(second.code, ResultCode::Ok);
	assert!(second.from_cache);
	assert_eq!(transport.call_count(), 1, "the warm hit must not hit the network");
}

#[tokio::test]
async fn expired_entry_revalidates_with_304() {
	let transport = Arc::new(MockTransport::new());
	transport.respond_with("http://ex/a.png", HttpResponse::new(304));

	let bin: Arc<dyn CacheBin> = Arc::new(MemoryCacheBin::new());
	let mut meta = Config::new("response");
	meta.set("content-type", "image/png");
	bin.write(&cache_key("http://ex/a.png"), &Blob::from(&PNG_MAGIC), &meta).unwrap();
	let stamp_before = bin.read(&cache_key("http://ex/a.png")).stamp.unwrap();

	std::thread::sleep(Duration::from_millis(20));

	let client = client_with(transport.clone(), Some(bin.clone())).with_policy(CachePolicy {
		force_expire: true,
		..CachePolicy::with_max_age(Duration::from_secs(60))
	});

	let result = client.read_image(&HttpRequest::new("http://ex/a.png"), &NoProgress).await;

	assert_eq!(result.code, ResultCode::Ok, "the cached body must be served");
	assert!(result.from_cache);
	assert_eq!(transport.call_count(), 1);
	assert!(transport.last_request().unwrap().if_modified_since.is_some());

	let stamp_after = bin.read(&cache_key("http://ex/a.png")).stamp.unwrap();
	assert!(stamp_after > stamp_before, "the 304 must touch the entry");
	assert!(
		stamp_after.elapsed().unwrap() < Duration::from_secs(1),
		"the touched stamp must be fresh"
	);
}

#[tokio::test]
async fn multipart_payload_decodes_into_two_parts() {
	let body = b"--wcs\nContent-Type: image/tiff\n\n\x01\x02\x03\x04\x05\x06\x07\x08\n--wcs\nContent-Type: text/plain\n\nhello\n--wcs--";
	let parts = parse_multipart(body, "wcs").unwrap();

	assert_eq!(parts.len(), 2);
	assert_eq!(parts[0].mime(), Some("image/tiff"));
	assert_eq!(parts[0].size(), 8);
	assert_eq!(parts[1].mime(), Some("text/plain"));
	assert_eq!(parts[1].data.as_slice(), b"hello");
}

/// Cancels the transfer as soon as the first chunk is reported.
#[derive(Default)]
struct CancelOnFirstChunk {
	reports: AtomicUsize,
	state: ProgressState,
}

impl Progress for CancelOnFirstChunk {
	fn report(&self, _done: u64, _total: u64) -> bool {
		self.reports.fetch_add(1, Ordering::SeqCst);
		true
	}

	fn is_canceled(&self) -> bool {
		self.state.is_canceled()
	}

	fn cancel(&self) {
		self.state.cancel();
	}

	fn set_retry_delay(&self, seconds: f64) {
		self.state.set_retry_delay(seconds);
	}

	fn retry_delay(&self) -> Option<f64> {
		self.state.retry_delay()
	}

	fn set_message(&self, message: &str) {
		self.state.set_message(message);
	}

	fn message(&self) -> String {
		self.state.message()
	}
}

#[tokio::test]
async fn cancellation_aborts_and_leaves_cache_empty() {
	let transport = Arc::new(MockTransport::new());
	transport.respond_with("http://ex/a.png", MockTransport::ok_response("image/png", &PNG_MAGIC));

	let bin: Arc<dyn CacheBin> = Arc::new(MemoryCacheBin::new());
	let client = client_with(transport, Some(bin.clone()));

	let progress = CancelOnFirstChunk::default();
	let result = client.read_image(&HttpRequest::new("http://ex/a.png"), &progress).await;

	assert_eq!(result.code, ResultCode::Canceled);
	assert!(!result.error_detail.is_empty(), "the backend message must be surfaced");
	assert_eq!(progress.reports.load(Ordering::SeqCst), 1);
	assert_eq!(bin.entry_count(), 0, "a canceled transfer must not be cached");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn single_flight_per_tile_key() {
	init_logging();
	let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(50)));
	transport.respond_with(
		"http://ex/14/1000/2000.png",
		MockTransport::ok_response("image/png", &PNG_MAGIC),
	);

	let client = Arc::new(client_with(transport.clone(), Some(Arc::new(MemoryCacheBin::new()))));
	let pipeline = Arc::new(TilePipeline::new("http://ex/{z}/{x}/{y}.png", client));

	let key = TileKey::new(14, 1000, 2000, TileProfile::WebMercator).unwrap();
	let mut tasks = Vec::new();
	for _ in 0..10 {
		let pipeline = Arc::clone(&pipeline);
		tasks.push(tokio::spawn(async move {
			pipeline.fetch_tile(&key, &NoProgress).await
		}));
	}

	let mut results = Vec::new();
	for task in tasks {
		results.push(task.await.unwrap());
	}

	assert_eq!(transport.call_count(), 1, "exactly one transport call per key");
	for result in &results {
		assert_eq!(result.code, ResultCode::Ok);
		let image = result.image().expect("every caller gets the tile");
		assert_eq!((image.width(), image.height()), (1, 1));
	}
	assert_eq!(
		results.iter().filter(|r| !r.from_cache).count(),
		1,
		"only the first caller goes upstream; the rest reuse its result"
	);
}

#[tokio::test]
async fn distinct_keys_fetch_independently() {
	let transport = Arc::new(MockTransport::new());
	transport.respond_by_default(MockTransport::ok_response("image/png", &PNG_MAGIC));

	let client = Arc::new(client_with(transport.clone(), Some(Arc::new(MemoryCacheBin::new()))));
	let pipeline = Arc::new(TilePipeline::new("http://ex/{z}/{x}/{y}.png", client));

	for x in 0..4 {
		let key = TileKey::new(3, x, 0, TileProfile::WebMercator).unwrap();
		let result = pipeline.fetch_tile(&key, &NoProgress).await;
		assert_eq!(result.code, ResultCode::Ok);
	}
	assert_eq!(transport.call_count(), 4);
}
