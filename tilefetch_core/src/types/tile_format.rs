//! This module defines the `TileFormat` enum, representing the payload
//! formats a tile source or store can carry. It includes methods for
//! converting between formats, file extensions and MIME types.
//!
//! # Examples
//!
//! ```
//! use tilefetch_core::TileFormat;
//!
//! let format = TileFormat::PNG;
//! assert_eq!(format.extension(), ".png");
//! assert_eq!(TileFormat::parse_str("jpeg").unwrap(), TileFormat::JPG);
//! ```

use anyhow::{Result, bail};
use std::fmt::Display;

// Enum representing supported tile payload formats
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TileFormat {
	BIN,
	JPG,
	PBF,
	PNG,
	TIFF,
	WEBP,
}

impl Display for TileFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			TileFormat::BIN => "bin",
			TileFormat::JPG => "jpg",
			TileFormat::PBF => "pbf",
			TileFormat::PNG => "png",
			TileFormat::TIFF => "tif",
			TileFormat::WEBP => "webp",
		})
	}
}

impl TileFormat {
	pub fn extension(&self) -> &str {
		match self {
			TileFormat::BIN => ".bin",
			TileFormat::JPG => ".jpg",
			TileFormat::PBF => ".pbf",
			TileFormat::PNG => ".png",
			TileFormat::TIFF => ".tif",
			TileFormat::WEBP => ".webp",
		}
	}

	pub fn mime(&self) -> &str {
		match self {
			TileFormat::BIN => "application/octet-stream",
			TileFormat::JPG => "image/jpeg",
			TileFormat::PBF => "application/x-protobuf",
			TileFormat::PNG => "image/png",
			TileFormat::TIFF => "image/tiff",
			TileFormat::WEBP => "image/webp",
		}
	}

	pub fn parse_str(value: &str) -> Result<Self> {
		Ok(match value.to_lowercase().trim_matches([' ', '.']) {
			"bin" => TileFormat::BIN,
			"jpeg" => TileFormat::JPG,
			"jpg" => TileFormat::JPG,
			"pbf" => TileFormat::PBF,
			"png" => TileFormat::PNG,
			"tif" => TileFormat::TIFF,
			"tiff" => TileFormat::TIFF,
			"webp" => TileFormat::WEBP,
			_ => bail!("unknown tile format \"{value}\""),
		})
	}

	/// True for formats that decode to raster images.
	pub fn is_raster(&self) -> bool {
		matches!(
			self,
			TileFormat::JPG | TileFormat::PNG | TileFormat::TIFF | TileFormat::WEBP
		)
	}
}
