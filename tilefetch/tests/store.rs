//! Tests of the local tile stores: MBTiles archives as tile sinks and the
//! SQLite cache bin plugged into the HTTP client.

use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tilefetch::{
	core::{ResultCode, TileFormat, TileKey, TileProfile, progress::NoProgress},
	http::{
		HttpClient, HttpRequest,
		cache::{CacheBin, CachePolicy},
		client::ClientEnv,
		decode::DecoderRegistry,
		transport::mock::MockTransport,
	},
	store::{MbtilesStore, SqliteCacheBin},
};

fn tile_image() -> image::DynamicImage {
	let mut img = image::RgbaImage::new(4, 4);
	for pixel in img.pixels_mut() {
		*pixel = image::Rgba([10, 20, 30, 255]);
	}
	image::DynamicImage::ImageRgba8(img)
}

#[test]
fn mbtiles_roundtrip_through_registry() -> Result<()> {
	let dir = tempfile::tempdir()?;
	let path = dir.path().join("tiles.mbtiles");
	let registry = DecoderRegistry::new_default();

	let store = MbtilesStore::create(&path, TileFormat::PNG, TileProfile::WebMercator)?;
	let key = TileKey::new(4, 5, 6, TileProfile::WebMercator)?;
	assert!(store.write_image(&key, &tile_image(), &registry)?);

	let restored = store.read_image(&key, &registry)?.expect("tile must exist");
	assert_eq!(restored.width(), 4);
	assert_eq!(restored.to_rgba8().get_pixel(0, 0).0, [10, 20, 30, 255]);

	// reopen cold and scan the real levels
	drop(store);
	let reopened = MbtilesStore::open(&path, None, true)?;
	assert_eq!(reopened.format(), TileFormat::PNG);
	assert_eq!(reopened.levels(), (4, 4));
	assert!(reopened.read(&key)?.is_some());
	assert!(reopened.read(&TileKey::new(4, 0, 0, TileProfile::WebMercator)?)?.is_none());
	Ok(())
}

#[tokio::test]
async fn sqlite_bin_backs_the_http_cache() -> Result<()> {
	let dir = tempfile::tempdir()?;
	let bin: Arc<dyn CacheBin> = Arc::new(SqliteCacheBin::open(&dir.path().join("cache.sqlite"))?);

	let transport = Arc::new(MockTransport::new());
	transport.respond_with(
		"http://ex/doc.txt",
		MockTransport::ok_response("text/plain", "tile description"),
	);

	let client = HttpClient::with_env(ClientEnv::default())?
		.with_transport(transport.clone())
		.with_cache_bin(Some(bin.clone()))
		.with_policy(CachePolicy::with_max_age(Duration::from_secs(60)));

	let request = HttpRequest::new("http://ex/doc.txt");

	let first = client.read_string(&request, &NoProgress).await;
	assert_eq!(first.code, ResultCode::Ok);
	assert_eq!(first.text(), Some("tile description"));
	assert_eq!(bin.entry_count(), 1);

	let second = client.read_string(&request, &NoProgress).await;
	assert_eq!(second.code, ResultCode::Ok);
	assert!(second.from_cache);
	assert_eq!(transport.call_count(), 1, "the persisted entry must satisfy the second read");
	Ok(())
}
