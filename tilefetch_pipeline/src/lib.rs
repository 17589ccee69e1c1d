//! Tile pipeline: per-key single-flight fetching, URL templating, feature
//! rasterization and the render-thread job arena.

pub mod arena;
pub use arena::{GpuContext, JobArena, JobHandle, global_arena};
pub mod features;
pub use features::{Feature, FeatureFilter, FeatureSource, Style};
pub mod keygate;
pub use keygate::Keygate;
pub mod raster;
pub use raster::FeatureTilePipeline;
pub mod template;
pub use template::expand_template;
pub mod tile_source;
pub use tile_source::TilePipeline;
