//! This module defines [`ReadResult`], the typed outcome of a read: the
//! decoded content (or an error code), timing, cache provenance and a
//! metadata Config reproducing the request and response headers.

use crate::decode::Decoded;
use image::DynamicImage;
use std::time::{Duration, SystemTime};
use tilefetch_core::{Config, ResultCode};

/// Outcome of a typed read. Errors never surface as `Err` from the read
/// API; they are carried here with their diagnostic detail.
#[derive(Debug)]
pub struct ReadResult {
	pub code: ResultCode,
	pub content: Option<Decoded>,
	pub last_modified: Option<SystemTime>,
	pub duration: Duration,
	pub from_cache: bool,
	/// Backend message or error body; callers may parse service exceptions
	/// out of it.
	pub error_detail: String,
	/// Request URL and headers, response headers and code.
	pub metadata: Config,
}

impl ReadResult {
	#[must_use]
	pub fn new(code: ResultCode, content: Option<Decoded>) -> ReadResult {
		ReadResult {
			code,
			content,
			last_modified: None,
			duration: Duration::ZERO,
			from_cache: false,
			error_detail: String::new(),
			metadata: Config::new("metadata"),
		}
	}

	#[must_use]
	pub fn failed(code: ResultCode, detail: impl ToString) -> ReadResult {
		let mut result = ReadResult::new(code, None);
		result.error_detail = detail.to_string();
		result
	}

	#[must_use]
	pub fn succeeded(&self) -> bool {
		self.code.is_ok()
	}

	#[must_use]
	pub fn image(&self) -> Option<&DynamicImage> {
		self.content.as_ref().and_then(Decoded::as_image)
	}

	#[must_use]
	pub fn text(&self) -> Option<&str> {
		self.content.as_ref().and_then(Decoded::as_text)
	}
}
