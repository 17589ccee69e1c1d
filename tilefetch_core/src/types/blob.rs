//! This module provides the [`Blob`] struct, a wrapper around [`Vec<u8>`] used
//! for tile payloads, cached entries and response part bodies.
//!
//! # Examples
//!
//! ```rust
//! use tilefetch_core::Blob;
//!
//! let blob = Blob::from("Hello, world!");
//! assert_eq!(blob.len(), 13);
//! assert_eq!(blob.as_str().unwrap(), "Hello, world!");
//! ```

use anyhow::Result;
use std::fmt::Debug;

/// A simple wrapper around [`Vec<u8>`] carrying fetched or cached byte data.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Blob(Vec<u8>);

impl Blob {
	/// Creates an empty `Blob`.
	#[must_use]
	pub fn new_empty() -> Blob {
		Blob(Vec::new())
	}

	/// Returns the underlying bytes as a slice.
	#[must_use]
	pub fn as_slice(&self) -> &[u8] {
		&self.0
	}

	/// Interprets the bytes as UTF-8 text.
	pub fn as_str(&self) -> Result<&str> {
		Ok(std::str::from_utf8(&self.0)?)
	}

	/// Consumes the `Blob`, returning the inner vector.
	#[must_use]
	pub fn into_vec(self) -> Vec<u8> {
		self.0
	}

	/// Returns the number of bytes.
	#[must_use]
	pub fn len(&self) -> u64 {
		self.0.len() as u64
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Vec<u8>> for Blob {
	fn from(vec: Vec<u8>) -> Self {
		Blob(vec)
	}
}

impl From<&Vec<u8>> for Blob {
	fn from(vec: &Vec<u8>) -> Self {
		Blob(vec.clone())
	}
}

impl From<&[u8]> for Blob {
	fn from(slice: &[u8]) -> Self {
		Blob(slice.to_vec())
	}
}

impl<const N: usize> From<&[u8; N]> for Blob {
	fn from(slice: &[u8; N]) -> Self {
		Blob(slice.to_vec())
	}
}

impl From<&str> for Blob {
	fn from(text: &str) -> Self {
		Blob(text.as_bytes().to_vec())
	}
}

impl From<String> for Blob {
	fn from(text: String) -> Self {
		Blob(text.into_bytes())
	}
}

impl From<&String> for Blob {
	fn from(text: &String) -> Self {
		Blob(text.as_bytes().to_vec())
	}
}

impl Debug for Blob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Blob").field("len", &self.0.len()).finish()
	}
}
