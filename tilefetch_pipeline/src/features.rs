//! Feature model for rasterized vector tiles: geometries with properties,
//! the source they are queried from and the filter chain applied before
//! rasterization. Concrete vector formats are decoded elsewhere; the
//! pipeline only sees [`Feature`]s.

use anyhow::Result;
use async_trait::async_trait;
use geo::Geometry;
use tilefetch_core::{Config, GeoBounds};

/// One vector feature: a geometry in degrees plus its properties.
#[derive(Clone, Debug)]
pub struct Feature {
	pub geometry: Geometry<f64>,
	pub properties: Config,
}

impl Feature {
	#[must_use]
	pub fn new(geometry: Geometry<f64>) -> Feature {
		Feature {
			geometry,
			properties: Config::new("properties"),
		}
	}
}

/// Supplies the features intersecting a query window.
#[async_trait]
pub trait FeatureSource: Send + Sync {
	async fn features_in(&self, bounds: &GeoBounds) -> Result<Vec<Feature>>;
}

/// One step of the ordered filter chain a pipeline runs before
/// rasterization.
pub trait FeatureFilter: Send + Sync {
	fn name(&self) -> &str;
	fn apply(&self, features: Vec<Feature>) -> Vec<Feature>;
}

/// Rendering style for rasterized features, colors as RGBA.
#[derive(Clone, Copy, Debug)]
pub struct Style {
	pub fill: [u8; 4],
	pub stroke: [u8; 4],
	pub stroke_width: f32,
	pub point_radius: i32,
}

impl Default for Style {
	fn default() -> Self {
		Style {
			fill: [128, 128, 128, 255],
			stroke: [0, 0, 0, 255],
			stroke_width: 1.0,
			point_radius: 2,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use geo::point;

	#[test]
	fn feature_carries_properties() {
		let mut feature = Feature::new(Geometry::Point(point!(x: 1.0, y: 2.0)));
		feature.properties.set("kind", "poi");
		assert_eq!(feature.properties.get("kind"), Some("poi"));
	}
}
