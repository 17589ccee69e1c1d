//! This module defines the `TileKey` structure identifying one tile in a
//! tiling scheme, and the `TileProfile` enum naming the scheme itself.
//! Two keys are equal iff level, column, row and profile all match; that
//! equality is what the pipeline serializes concurrent fetches on.
//!
//! # Examples
//!
//! ```
//! use tilefetch_core::{TileKey, TileProfile};
//!
//! let key = TileKey::new(3, 2, 1, TileProfile::WebMercator).unwrap();
//! assert_eq!(key.level, 3);
//! assert_eq!(key.flipped_y(), 6);
//! let bounds = key.bounds();
//! assert!(bounds.west < bounds.east);
//! ```

use super::GeoBounds;
use anyhow::{Result, bail, ensure};
use std::{
	f64::consts::PI,
	fmt::{self, Debug, Display},
};

/// A tiling scheme: coordinate system plus root tile grid. Source and cache
/// must share a profile for their keys to be compatible.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum TileProfile {
	/// Square spherical-mercator grid, one root tile.
	#[default]
	WebMercator,
	/// Plate-carrée grid, two root tiles side by side.
	Geodetic,
}

impl TileProfile {
	pub fn parse_str(value: &str) -> Result<Self> {
		Ok(match value.to_lowercase().trim() {
			"mercator" | "web-mercator" | "spherical-mercator" => TileProfile::WebMercator,
			"geodetic" | "global-geodetic" | "wgs84" => TileProfile::Geodetic,
			_ => bail!("unknown tile profile \"{value}\""),
		})
	}

	/// Number of tile columns at `level`.
	#[must_use]
	pub fn columns_at(&self, level: u8) -> u32 {
		match self {
			TileProfile::WebMercator => 1u32 << level,
			TileProfile::Geodetic => 2u32 << level,
		}
	}

	/// Number of tile rows at `level`.
	#[must_use]
	pub fn rows_at(&self, level: u8) -> u32 {
		1u32 << level
	}

	/// Full geographic extent of the profile.
	#[must_use]
	pub fn extent(&self) -> GeoBounds {
		match self {
			TileProfile::WebMercator => GeoBounds::new(-180.0, -85.0511287798066, 180.0, 85.0511287798066),
			TileProfile::Geodetic => GeoBounds::new(-180.0, -90.0, 180.0, 90.0),
		}
	}
}

impl Display for TileProfile {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			TileProfile::WebMercator => "web-mercator",
			TileProfile::Geodetic => "geodetic",
		})
	}
}

/// Identifies one tile: zoom level, column, row and tiling profile.
///
/// The row follows the XYZ convention (y grows southwards from the top);
/// [`TileKey::flipped_y`] converts to the TMS convention used on disk by
/// MBTiles archives.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
	pub level: u8,
	pub x: u32,
	pub y: u32,
	pub profile: TileProfile,
}

impl TileKey {
	pub fn new(level: u8, x: u32, y: u32, profile: TileProfile) -> Result<TileKey> {
		ensure!(level <= 30, "level ({level}) must be <= 30");
		let key = TileKey { level, x, y, profile };
		ensure!(
			key.is_valid(),
			"tile coordinates [{x}, {y}] are out of range for level {level} ({profile})"
		);
		Ok(key)
	}

	#[must_use]
	pub fn is_valid(&self) -> bool {
		self.level <= 30 && self.x < self.profile.columns_at(self.level) && self.y < self.profile.rows_at(self.level)
	}

	/// Row index in the TMS convention (`rows − 1 − y`).
	#[must_use]
	pub fn flipped_y(&self) -> u32 {
		self.profile.rows_at(self.level) - 1 - self.y
	}

	/// Geographic bounds of this tile.
	#[must_use]
	pub fn bounds(&self) -> GeoBounds {
		match self.profile {
			TileProfile::WebMercator => {
				let zoom = 2.0f64.powi(self.level as i32);
				let lat = |y: f64| ((PI * (1.0 - 2.0 * y / zoom)).exp().atan() / PI - 0.25) * 360.0;
				GeoBounds::new(
					((self.x as f64) / zoom - 0.5) * 360.0,
					lat((self.y + 1) as f64),
					(((self.x + 1) as f64) / zoom - 0.5) * 360.0,
					lat(self.y as f64),
				)
			}
			TileProfile::Geodetic => {
				let columns = self.profile.columns_at(self.level) as f64;
				let rows = self.profile.rows_at(self.level) as f64;
				let width = 360.0 / columns;
				let height = 180.0 / rows;
				GeoBounds::new(
					-180.0 + width * self.x as f64,
					90.0 - height * (self.y + 1) as f64,
					-180.0 + width * (self.x + 1) as f64,
					90.0 - height * self.y as f64,
				)
			}
		}
	}
}

impl Debug for TileKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_fmt(format_args!(
			"TileKey({}, [{}, {}], {})",
			&self.level, &self.x, &self.y, &self.profile
		))
	}
}

impl Display for TileKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_fmt(format_args!("{}/{}/{}", &self.level, &self.x, &self.y))
	}
}
