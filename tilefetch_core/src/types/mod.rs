//! Contains value types shared across the stack: byte blobs, tile keys and
//! profiles, tile formats and geographic bounds.

mod blob;
pub use blob::Blob;
mod geo_bounds;
pub use geo_bounds::GeoBounds;
mod tile_format;
pub use tile_format::TileFormat;
mod tile_key;
pub use tile_key::{TileKey, TileProfile};
