//! Rasterized feature tiles: query a feature source over the tile's
//! (buffered) bounds, run the filter chain, then rasterize with styles —
//! in software, or on the render thread when a hardware rasterizer is
//! installed.

use crate::{
	arena::{GpuContext, JobArena},
	features::{Feature, FeatureFilter, FeatureSource, Style},
	keygate::Keygate,
};
use anyhow::{Context, Result};
use geo::{Geometry, LineString};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_polygon_mut};
use log::trace;
use std::sync::Arc;
use tilefetch_core::{GeoBounds, TileKey};

/// Rasterizes on the render thread, inside an arena job.
pub trait HardwareRasterizer: Send + Sync {
	fn rasterize(
		&self,
		context: &mut GpuContext,
		features: &[Feature],
		bounds: &GeoBounds,
		style: &Style,
		tile_size: u32,
	) -> RgbaImage;
}

/// Produces raster tiles from a vector feature source.
pub struct FeatureTilePipeline {
	source: Arc<dyn FeatureSource>,
	filters: Vec<Box<dyn FeatureFilter>>,
	style: Style,
	tile_size: u32,
	/// Degrees added around the tile bounds when querying, so strokes near
	/// the edge come out unclipped.
	buffer: f64,
	keygate: Keygate,
	hardware: Option<(Arc<dyn HardwareRasterizer>, &'static JobArena)>,
}

impl FeatureTilePipeline {
	#[must_use]
	pub fn new(source: Arc<dyn FeatureSource>) -> FeatureTilePipeline {
		FeatureTilePipeline {
			source,
			filters: Vec::new(),
			style: Style::default(),
			tile_size: 256,
			buffer: 0.0,
			keygate: Keygate::new(),
			hardware: None,
		}
	}

	#[must_use]
	pub fn with_filter(mut self, filter: Box<dyn FeatureFilter>) -> FeatureTilePipeline {
		self.filters.push(filter);
		self
	}

	#[must_use]
	pub fn with_style(mut self, style: Style) -> FeatureTilePipeline {
		self.style = style;
		self
	}

	#[must_use]
	pub fn with_tile_size(mut self, tile_size: u32) -> FeatureTilePipeline {
		self.tile_size = tile_size;
		self
	}

	#[must_use]
	pub fn with_buffer(mut self, buffer: f64) -> FeatureTilePipeline {
		self.buffer = buffer;
		self
	}

	/// Routes rasterization through the arena's render-thread consumer.
	#[must_use]
	pub fn with_hardware(
		mut self,
		rasterizer: Arc<dyn HardwareRasterizer>,
		arena: &'static JobArena,
	) -> FeatureTilePipeline {
		self.hardware = Some((rasterizer, arena));
		self
	}

	/// Builds the raster tile for one key.
	pub async fn rasterize_tile(&self, key: &TileKey) -> Result<RgbaImage> {
		let _gate = self.keygate.lock(key).await;

		let bounds = key.bounds();
		let query = bounds.expanded_by(self.buffer);
		let mut features = self.source.features_in(&query).await?;
		trace!("{} features for {key:?}", features.len());

		for filter in &self.filters {
			features = filter.apply(features);
		}

		match &self.hardware {
			Some((rasterizer, arena)) => {
				let rasterizer = Arc::clone(rasterizer);
				let style = self.style;
				let tile_size = self.tile_size;
				let handle =
					arena.dispatch(move |context| rasterizer.rasterize(context, &features, &bounds, &style, tile_size));
				handle.wait().await.context("rasterization job was abandoned")
			}
			None => Ok(rasterize(&features, &bounds, &self.style, self.tile_size)),
		}
	}
}

/// Software rasterizer: fills polygons, strokes lines, dots points.
#[must_use]
pub fn rasterize(features: &[Feature], bounds: &GeoBounds, style: &Style, tile_size: u32) -> RgbaImage {
	let mut image = RgbaImage::new(tile_size, tile_size);
	let fill = Rgba(style.fill);
	let stroke = Rgba(style.stroke);

	let size = tile_size as f64;
	let to_pixel = |x: f64, y: f64| -> (f64, f64) {
		(
			(x - bounds.west) / bounds.width() * size,
			(bounds.north - y) / bounds.height() * size,
		)
	};

	for feature in features {
		draw_geometry(&mut image, &feature.geometry, &to_pixel, fill, stroke, style.point_radius);
	}

	image
}

fn draw_geometry(
	image: &mut RgbaImage,
	geometry: &Geometry<f64>,
	to_pixel: &impl Fn(f64, f64) -> (f64, f64),
	fill: Rgba<u8>,
	stroke: Rgba<u8>,
	point_radius: i32,
) {
	match geometry {
		Geometry::Point(point) => {
			let (x, y) = to_pixel(point.x(), point.y());
			draw_filled_circle_mut(image, (x as i32, y as i32), point_radius, fill);
		}
		Geometry::MultiPoint(points) => {
			for point in points.iter() {
				let (x, y) = to_pixel(point.x(), point.y());
				draw_filled_circle_mut(image, (x as i32, y as i32), point_radius, fill);
			}
		}
		Geometry::Line(line) => {
			let (x0, y0) = to_pixel(line.start.x, line.start.y);
			let (x1, y1) = to_pixel(line.end.x, line.end.y);
			draw_line_segment_mut(image, (x0 as f32, y0 as f32), (x1 as f32, y1 as f32), stroke);
		}
		Geometry::LineString(line) => draw_line_string(image, line, to_pixel, stroke),
		Geometry::MultiLineString(lines) => {
			for line in lines.iter() {
				draw_line_string(image, line, to_pixel, stroke);
			}
		}
		Geometry::Polygon(polygon) => draw_ring(image, polygon.exterior(), to_pixel, fill),
		Geometry::MultiPolygon(polygons) => {
			for polygon in polygons.iter() {
				draw_ring(image, polygon.exterior(), to_pixel, fill);
			}
		}
		Geometry::GeometryCollection(collection) => {
			for inner in collection.iter() {
				draw_geometry(image, inner, to_pixel, fill, stroke, point_radius);
			}
		}
		_ => {}
	}
}

fn draw_line_string(
	image: &mut RgbaImage,
	line: &LineString<f64>,
	to_pixel: &impl Fn(f64, f64) -> (f64, f64),
	stroke: Rgba<u8>,
) {
	let pixels: Vec<(f64, f64)> = line.coords().map(|c| to_pixel(c.x, c.y)).collect();
	for pair in pixels.windows(2) {
		draw_line_segment_mut(
			image,
			(pair[0].0 as f32, pair[0].1 as f32),
			(pair[1].0 as f32, pair[1].1 as f32),
			stroke,
		);
	}
}

fn draw_ring(
	image: &mut RgbaImage,
	ring: &LineString<f64>,
	to_pixel: &impl Fn(f64, f64) -> (f64, f64),
	fill: Rgba<u8>,
) {
	let mut points: Vec<imageproc::point::Point<i32>> = ring
		.coords()
		.map(|c| {
			let (x, y) = to_pixel(c.x, c.y);
			imageproc::point::Point::new(x as i32, y as i32)
		})
		.collect();

	// the drawing routine closes the ring itself
	while points.len() > 1 && points.first() == points.last() {
		points.pop();
	}
	points.dedup();
	if points.len() >= 3 {
		draw_polygon_mut(image, &points, fill);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::arena::global_arena;
	use async_trait::async_trait;
	use geo::{point, polygon};
	use parking_lot::Mutex;
	use tilefetch_core::TileProfile;

	struct FixedSource {
		features: Vec<Feature>,
		queries: Mutex<Vec<GeoBounds>>,
	}

	impl FixedSource {
		fn new(features: Vec<Feature>) -> FixedSource {
			FixedSource {
				features,
				queries: Mutex::new(Vec::new()),
			}
		}
	}

	#[async_trait]
	impl FeatureSource for FixedSource {
		async fn features_in(&self, bounds: &GeoBounds) -> Result<Vec<Feature>> {
			self.queries.lock().push(*bounds);
			Ok(self.features.clone())
		}
	}

	struct DropEverything;

	impl FeatureFilter for DropEverything {
		fn name(&self) -> &str {
			"drop-everything"
		}

		fn apply(&self, _features: Vec<Feature>) -> Vec<Feature> {
			Vec::new()
		}
	}

	fn world_key() -> TileKey {
		TileKey::new(0, 0, 0, TileProfile::Geodetic).unwrap()
	}

	fn covering_polygon() -> Feature {
		// covers the western hemisphere of the root geodetic tile
		Feature::new(Geometry::Polygon(polygon![
			(x: -180.0, y: -90.0),
			(x: -180.0, y: 90.0),
			(x: -90.0, y: 90.0),
			(x: -90.0, y: -90.0),
		]))
	}

	#[tokio::test]
	async fn rasterizes_polygon_fill() {
		let source = Arc::new(FixedSource::new(vec![covering_polygon()]));
		let pipeline = FeatureTilePipeline::new(source).with_tile_size(64);

		let image = pipeline.rasterize_tile(&world_key()).await.unwrap();
		assert_eq!(image.width(), 64);
		// inside the polygon
		assert_eq!(image.get_pixel(8, 32).0[3], 255);
		// far outside
		assert_eq!(image.get_pixel(60, 32).0[3], 0);
	}

	#[tokio::test]
	async fn filters_run_in_order() {
		let source = Arc::new(FixedSource::new(vec![covering_polygon()]));
		let pipeline = FeatureTilePipeline::new(source)
			.with_tile_size(32)
			.with_filter(Box::new(DropEverything));

		let image = pipeline.rasterize_tile(&world_key()).await.unwrap();
		assert!(image.pixels().all(|pixel| pixel.0[3] == 0), "filtered tile must be empty");
	}

	#[tokio::test]
	async fn query_bounds_are_buffered() {
		let source = Arc::new(FixedSource::new(Vec::new()));
		let pipeline = FeatureTilePipeline::new(Arc::clone(&source) as Arc<dyn FeatureSource>).with_buffer(5.0);

		let key = TileKey::new(1, 0, 0, TileProfile::Geodetic).unwrap();
		pipeline.rasterize_tile(&key).await.unwrap();

		let queries = source.queries.lock();
		let bounds = key.bounds();
		assert_eq!(queries.len(), 1);
		assert_eq!(queries[0].west, bounds.west - 5.0);
		assert_eq!(queries[0].north, bounds.north + 5.0);
	}

	#[tokio::test]
	async fn point_features_are_dotted() {
		let feature = Feature::new(Geometry::Point(point!(x: 0.0, y: 0.0)));
		let source = Arc::new(FixedSource::new(vec![feature]));
		let pipeline = FeatureTilePipeline::new(source).with_tile_size(64);

		let key = TileKey::new(0, 1, 0, TileProfile::Geodetic).unwrap();
		let image = pipeline.rasterize_tile(&key).await.unwrap();
		// the point sits on the tile's west edge, vertically centered
		assert_eq!(image.get_pixel(1, 32).0[3], 255);
	}

	struct SoftwareOnGpu;

	impl HardwareRasterizer for SoftwareOnGpu {
		fn rasterize(
			&self,
			context: &mut GpuContext,
			features: &[Feature],
			bounds: &GeoBounds,
			style: &Style,
			tile_size: u32,
		) -> RgbaImage {
			context.set_user("rasterized");
			super::rasterize(features, bounds, style, tile_size)
		}
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn hardware_path_runs_on_the_arena() {
		let source = Arc::new(FixedSource::new(vec![covering_polygon()]));
		let pipeline = Arc::new(
			FeatureTilePipeline::new(source)
				.with_tile_size(32)
				.with_hardware(Arc::new(SoftwareOnGpu), global_arena()),
		);

		let task = {
			let pipeline = Arc::clone(&pipeline);
			tokio::spawn(async move { pipeline.rasterize_tile(&world_key()).await })
		};

		// drive the render loop until the job resolves
		let mut context = GpuContext::new();
		while !task.is_finished() {
			global_arena().run_frame(&mut context);
			tokio::task::yield_now().await;
		}

		let image = task.await.unwrap().unwrap();
		assert_eq!(image.width(), 32);
		assert_eq!(image.get_pixel(4, 16).0[3], 255);
	}
}
