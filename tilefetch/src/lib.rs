//! # tilefetch
//!
//! An HTTP-backed tile fetching stack with cache coherence: pluggable
//! transports, a read-through cache keyed by URL fingerprint, multipart
//! decoding, per-key single-flight fetching and local MBTiles-style
//! stores.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tilefetch::{
//!     core::{TileKey, TileProfile, progress::NoProgress},
//!     http::HttpClient,
//!     pipeline::TilePipeline,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Arc::new(HttpClient::new()?);
//!     let tiles = TilePipeline::new("https://tile.example.com/{z}/{x}/{y}.png", client);
//!
//!     let key = TileKey::new(14, 1000, 2000, TileProfile::WebMercator)?;
//!     let result = tiles.fetch_tile(&key, &NoProgress).await;
//!     if result.succeeded() {
//!         println!("got a {}×{} tile", result.image().unwrap().width(), result.image().unwrap().height());
//!     }
//!     Ok(())
//! }
//! ```

pub use tilefetch_core as core;
pub use tilefetch_http as http;
pub use tilefetch_pipeline as pipeline;
pub use tilefetch_store as store;
