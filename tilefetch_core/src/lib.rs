//! Core types for the tilefetch stack: blobs, tile keys, the Config tree,
//! result codes and progress reporting.

pub mod config;
pub use config::Config;
pub mod error;
pub use error::ResultCode;
pub mod json;
pub mod progress;
pub mod types;
pub use types::*;
