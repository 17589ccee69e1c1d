//! This module provides the [`MbtilesStore`], reading and writing tile data
//! in an MBTiles SQLite database.
//!
//! The on-disk layout is the usual `tiles(zoom_level, tile_column,
//! tile_row, tile_data)` plus a `metadata(name, value)` table. Rows use the
//! TMS convention (`tile_row` counts from the south), so keys are y-flipped
//! on the way in and out. Reads and writes are serialized by one mutex;
//! correctness before concurrency.

use anyhow::{Context, Result, bail, ensure};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use image::DynamicImage;
use log::trace;
use parking_lot::Mutex;
use r2d2::Pool;
use r2d2_sqlite::{SqliteConnectionManager, rusqlite::params};
use std::{
	io::{Read, Write},
	path::Path,
};
use tilefetch_core::{Blob, Config, GeoBounds, TileFormat, TileKey, TileProfile};
use tilefetch_http::decode::DecoderRegistry;

/// A local MBTiles tile archive usable as an alternate tile source or sink.
pub struct MbtilesStore {
	name: String,
	pool: Pool<SqliteConnectionManager>,
	io_lock: Mutex<()>,
	format: TileFormat,
	gzipped: bool,
	profile: TileProfile,
	min_level: u8,
	max_level: u8,
	bounds: GeoBounds,
}

impl MbtilesStore {
	/// Opens an existing archive. `format` supplies the tile format when
	/// the metadata table does not name one; `compute_levels` scans the
	/// tile rows for the real zoom range instead of trusting metadata.
	pub fn open(path: &Path, format: Option<TileFormat>, compute_levels: bool) -> Result<MbtilesStore> {
		trace!("open {path:?}");
		ensure!(path.exists(), "file {path:?} does not exist");

		let manager = SqliteConnectionManager::file(path);
		let pool = Pool::builder().max_size(10).build(manager)?;

		let mut store = MbtilesStore {
			name: path.to_string_lossy().to_string(),
			pool,
			io_lock: Mutex::new(()),
			format: format.unwrap_or(TileFormat::PNG),
			gzipped: false,
			profile: TileProfile::WebMercator,
			min_level: 0,
			max_level: 0,
			bounds: TileProfile::WebMercator.extent(),
		};

		store.load_metadata(format)?;
		if compute_levels {
			store.compute_levels()?;
		}

		Ok(store)
	}

	/// Creates a fresh archive with the tables, indices and metadata the
	/// readers expect.
	pub fn create(path: &Path, format: TileFormat, profile: TileProfile) -> Result<MbtilesStore> {
		trace!("create {path:?}");

		let manager = SqliteConnectionManager::file(path);
		let pool = Pool::builder().max_size(10).build(manager)?;

		pool.get()?.execute_batch(
			"CREATE TABLE IF NOT EXISTS metadata (name TEXT, value TEXT, UNIQUE (name));
			CREATE TABLE IF NOT EXISTS tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB, UNIQUE (zoom_level, tile_column, tile_row));
			CREATE UNIQUE INDEX IF NOT EXISTS tile_index on tiles (zoom_level, tile_column, tile_row);",
		)?;

		let store = MbtilesStore {
			name: path.to_string_lossy().to_string(),
			pool,
			io_lock: Mutex::new(()),
			format,
			gzipped: format == TileFormat::PBF,
			profile,
			min_level: 0,
			max_level: 0,
			bounds: profile.extent(),
		};

		// the tile format is stored once so every writer stays consistent
		store.set_metadata("format", &format.to_string())?;
		store.set_metadata("profile", &profile.to_string())?;
		if store.gzipped {
			store.set_metadata("compression", "gzip")?;
		}

		Ok(store)
	}

	fn load_metadata(&mut self, format_override: Option<TileFormat>) -> Result<()> {
		trace!("load_metadata");

		let conn = self.pool.get()?;
		let mut stmt = conn.prepare("SELECT name, value FROM metadata")?;
		let entries = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

		let mut format: Option<TileFormat> = None;

		for entry in entries {
			let (name, value) = entry?;
			match name.as_str() {
				"format" => format = Some(TileFormat::parse_str(&value)?),
				"compression" => self.gzipped = value.eq_ignore_ascii_case("gzip"),
				"profile" => self.profile = TileProfile::parse_str(&value)?,
				"minzoom" => self.min_level = value.trim().parse().context("invalid minzoom")?,
				"maxzoom" => self.max_level = value.trim().parse().context("invalid maxzoom")?,
				"bounds" => self.bounds = parse_bounds(&value)?,
				_ => {}
			}
		}

		self.format = match (format, format_override) {
			(Some(found), _) => found,
			(None, Some(fallback)) => fallback,
			(None, None) => bail!("mbtiles file {} does not specify a tile format", self.name),
		};
		if self.format == TileFormat::PBF && format.is_none() {
			self.gzipped = true;
		}

		Ok(())
	}

	/// Scans existing rows for the real zoom range.
	fn compute_levels(&mut self) -> Result<()> {
		trace!("compute_levels");

		let conn = self.pool.get()?;
		let mut stmt = conn.prepare("SELECT DISTINCT zoom_level FROM tiles ORDER BY zoom_level")?;
		let levels: Vec<u8> = stmt
			.query_map([], |row| row.get::<_, u8>(0))?
			.collect::<Result<_, _>>()?;

		if let (Some(first), Some(last)) = (levels.first(), levels.last()) {
			self.min_level = *first;
			self.max_level = *last;
		}

		Ok(())
	}

	fn set_metadata(&self, name: &str, value: &str) -> Result<()> {
		self.pool.get()?.execute(
			"INSERT OR REPLACE INTO metadata (name, value) VALUES (?1, ?2)",
			params![name, value],
		)?;
		Ok(())
	}

	/// Raw tile payload for a key, `None` when the row is absent.
	pub fn read(&self, key: &TileKey) -> Result<Option<Blob>> {
		trace!("read tile {key:?}");
		ensure!(key.profile == self.profile, "tile key profile does not match the store");

		let _guard = self.io_lock.lock();
		let conn = self.pool.get()?;
		let mut stmt =
			conn.prepare("SELECT tile_data FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3")?;

		let row = stmt.query_row(params![key.level, key.x, key.flipped_y()], |row| {
			row.get::<_, Vec<u8>>(0)
		});

		match row {
			Ok(data) if self.gzipped => Ok(Some(gzip_decompress(&data)?)),
			Ok(data) => Ok(Some(Blob::from(data))),
			Err(r2d2_sqlite::rusqlite::Error::QueryReturnedNoRows) => Ok(None),
			Err(error) => Err(error.into()),
		}
	}

	/// Decodes the stored payload into a raster image via the registry.
	pub fn read_image(&self, key: &TileKey, registry: &DecoderRegistry) -> Result<Option<DynamicImage>> {
		let Some(data) = self.read(key)? else {
			return Ok(None);
		};
		let decoder = registry
			.select(data.as_slice(), self.format.extension(), self.format.mime())
			.with_context(|| format!("no decoder for stored {} tiles", self.format))?;
		let decoded = decoder.decode(&data, &Config::new("options"))?;
		decoded
			.as_image()
			.cloned()
			.map(Some)
			.with_context(|| format!("stored {} tile did not decode to an image", self.format))
	}

	/// Encodes `image` in the store's format and writes it under `key`.
	/// Returns `true` on success.
	pub fn write_image(&self, key: &TileKey, image: &DynamicImage, registry: &DecoderRegistry) -> Result<bool> {
		trace!("write tile {key:?}");
		ensure!(key.profile == self.profile, "tile key profile does not match the store");

		let encoded = registry.encode_image(image, self.format)?;
		let payload = if self.gzipped {
			gzip_compress(encoded.as_slice())?
		} else {
			encoded
		};

		let _guard = self.io_lock.lock();
		self.pool.get()?.execute(
			"INSERT OR REPLACE INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)",
			params![key.level, key.x, key.flipped_y(), payload.as_slice()],
		)?;

		Ok(true)
	}

	#[must_use]
	pub fn format(&self) -> TileFormat {
		self.format
	}

	#[must_use]
	pub fn profile(&self) -> TileProfile {
		self.profile
	}

	/// `(minzoom, maxzoom)` as opened or computed.
	#[must_use]
	pub fn levels(&self) -> (u8, u8) {
		(self.min_level, self.max_level)
	}

	#[must_use]
	pub fn bounds(&self) -> GeoBounds {
		self.bounds
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}
}

impl std::fmt::Debug for MbtilesStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MbtilesStore")
			.field("name", &self.name)
			.field("format", &self.format)
			.field("levels", &self.levels())
			.finish()
	}
}

fn parse_bounds(value: &str) -> Result<GeoBounds> {
	let numbers: Vec<f64> = value
		.split(',')
		.map(|part| part.trim().parse().context("invalid bounds value"))
		.collect::<Result<_>>()?;
	ensure!(numbers.len() == 4, "bounds must have 4 comma-separated values");
	Ok(GeoBounds::new(numbers[0], numbers[1], numbers[2], numbers[3]))
}

fn gzip_compress(data: &[u8]) -> Result<Blob> {
	let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
	encoder.write_all(data)?;
	Ok(Blob::from(encoder.finish()?))
}

fn gzip_decompress(data: &[u8]) -> Result<Blob> {
	let mut decoder = GzDecoder::new(data);
	let mut out = Vec::new();
	decoder.read_to_end(&mut out)?;
	Ok(Blob::from(out))
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_fs::TempDir;

	fn registry() -> DecoderRegistry {
		DecoderRegistry::new_default()
	}

	fn checker_image() -> DynamicImage {
		let mut image = image::RgbaImage::new(8, 8);
		for (x, y, pixel) in image.enumerate_pixels_mut() {
			let v = if (x + y) % 2 == 0 { 255 } else { 0 };
			*pixel = image::Rgba([v, 0, 255 - v, 255]);
		}
		DynamicImage::ImageRgba8(image)
	}

	#[test]
	fn create_write_read_roundtrip() -> Result<()> {
		let dir = TempDir::new()?;
		let path = dir.path().join("tiles.mbtiles");

		let store = MbtilesStore::create(&path, TileFormat::PNG, TileProfile::WebMercator)?;
		let key = TileKey::new(3, 2, 1, TileProfile::WebMercator)?;
		assert!(store.write_image(&key, &checker_image(), &registry())?);

		let data = store.read(&key)?.unwrap();
		assert!(data.as_slice().starts_with(&[0x89, b'P', b'N', b'G']));

		let image = store.read_image(&key, &registry())?.unwrap();
		assert_eq!(image.width(), 8);

		// absent rows read as not-found, not as errors
		let missing = TileKey::new(3, 0, 0, TileProfile::WebMercator)?;
		assert!(store.read(&missing)?.is_none());
		Ok(())
	}

	#[test]
	fn rows_use_tms_convention() -> Result<()> {
		let dir = TempDir::new()?;
		let path = dir.path().join("tiles.mbtiles");

		let store = MbtilesStore::create(&path, TileFormat::PNG, TileProfile::WebMercator)?;
		let key = TileKey::new(2, 1, 0, TileProfile::WebMercator)?;
		store.write_image(&key, &checker_image(), &registry())?;

		// level 2 has 4 rows; XYZ row 0 lands in TMS row 3
		let conn = store.pool.get()?;
		let row: u32 = conn.query_row(
			"SELECT tile_row FROM tiles WHERE zoom_level = 2 AND tile_column = 1",
			[],
			|row| row.get(0),
		)?;
		assert_eq!(row, 3);
		Ok(())
	}

	#[test]
	fn reopen_reads_metadata_and_levels() -> Result<()> {
		let dir = TempDir::new()?;
		let path = dir.path().join("tiles.mbtiles");

		{
			let store = MbtilesStore::create(&path, TileFormat::PNG, TileProfile::WebMercator)?;
			let reg = registry();
			store.write_image(&TileKey::new(2, 0, 0, TileProfile::WebMercator)?, &checker_image(), &reg)?;
			store.write_image(&TileKey::new(5, 3, 3, TileProfile::WebMercator)?, &checker_image(), &reg)?;
		}

		let store = MbtilesStore::open(&path, None, true)?;
		assert_eq!(store.format(), TileFormat::PNG);
		assert_eq!(store.profile(), TileProfile::WebMercator);
		assert_eq!(store.levels(), (2, 5));
		Ok(())
	}

	#[test]
	fn open_missing_file_fails() {
		assert!(MbtilesStore::open(Path::new("/nonexistent/tiles.mbtiles"), None, false).is_err());
	}

	#[test]
	fn profile_mismatch_is_rejected() -> Result<()> {
		let dir = TempDir::new()?;
		let path = dir.path().join("tiles.mbtiles");
		let store = MbtilesStore::create(&path, TileFormat::PNG, TileProfile::WebMercator)?;

		let geodetic = TileKey::new(2, 1, 1, TileProfile::Geodetic)?;
		assert!(store.read(&geodetic).is_err());
		assert!(store.write_image(&geodetic, &checker_image(), &registry()).is_err());
		Ok(())
	}

	#[test]
	fn bounds_parsing() {
		let bounds = parse_bounds("-10.5, -20, 30, 40.25").unwrap();
		assert_eq!(bounds.west, -10.5);
		assert_eq!(bounds.north, 40.25);
		assert!(parse_bounds("1,2,3").is_err());
		assert!(parse_bounds("a,b,c,d").is_err());
	}

	#[test]
	fn gzip_roundtrip() {
		let data = b"some tile payload".to_vec();
		let compressed = gzip_compress(&data).unwrap();
		assert_ne!(compressed.as_slice(), data.as_slice());
		let restored = gzip_decompress(compressed.as_slice()).unwrap();
		assert_eq!(restored.as_slice(), data.as_slice());
	}
}
