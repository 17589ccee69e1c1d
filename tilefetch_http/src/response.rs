//! This module defines [`HttpResponse`] and its [`Part`]s. A response with
//! code 0 indicates transport failure; all other codes fall into the usual
//! HTTP status categories. Multipart content yields several parts, the
//! single-part response being the common case.

use crate::headers::Headers;
use std::time::{Duration, SystemTime};
use tilefetch_core::Blob;

/// One body segment of a response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Part {
	pub headers: Headers,
	pub data: Blob,
}

impl Part {
	#[must_use]
	pub fn new(headers: Headers, data: Blob) -> Part {
		Part { headers, data }
	}

	#[must_use]
	pub fn from_data(data: impl Into<Blob>) -> Part {
		Part {
			headers: Headers::new(),
			data: data.into(),
		}
	}

	/// Size of this part's body in bytes.
	#[must_use]
	pub fn size(&self) -> u64 {
		self.data.len()
	}

	/// The part's own content type, when present.
	#[must_use]
	pub fn mime(&self) -> Option<&str> {
		self.headers.get("content-type")
	}
}

/// Result of one transport GET (or a cache synthesis thereof).
#[derive(Clone, Debug, Default)]
pub struct HttpResponse {
	/// HTTP status; 0 means the transport itself failed.
	pub code: u16,
	pub mime: String,
	pub duration: Duration,
	pub last_modified: Option<SystemTime>,
	pub canceled: bool,
	pub from_cache: bool,
	/// Backend diagnostic, e.g. an error string on code 0.
	pub message: String,
	pub parts: Vec<Part>,
}

impl HttpResponse {
	#[must_use]
	pub fn new(code: u16) -> HttpResponse {
		HttpResponse {
			code,
			..Default::default()
		}
	}

	/// A code-0 failure response carrying the backend's message.
	#[must_use]
	pub fn failed(message: impl ToString, canceled: bool) -> HttpResponse {
		HttpResponse {
			code: 0,
			canceled,
			message: message.to_string(),
			..Default::default()
		}
	}

	#[must_use]
	pub fn is_ok(&self) -> bool {
		self.code == 200 && !self.canceled
	}

	#[must_use]
	pub fn is_informational(&self) -> bool {
		(100..200).contains(&self.code)
	}

	#[must_use]
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.code)
	}

	#[must_use]
	pub fn is_redirection(&self) -> bool {
		(300..400).contains(&self.code)
	}

	#[must_use]
	pub fn is_client_error(&self) -> bool {
		(400..500).contains(&self.code)
	}

	#[must_use]
	pub fn is_server_error(&self) -> bool {
		(500..600).contains(&self.code)
	}

	#[must_use]
	pub fn is_not_modified(&self) -> bool {
		self.code == 304
	}

	/// First part, when any.
	#[must_use]
	pub fn first_part(&self) -> Option<&Part> {
		self.parts.first()
	}

	/// Body of the first part, or an empty blob.
	#[must_use]
	pub fn first_data(&self) -> Blob {
		self.parts.first().map(|p| p.data.clone()).unwrap_or_default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn categories_partition_codes() {
		assert!(HttpResponse::new(101).is_informational());
		assert!(HttpResponse::new(200).is_success());
		assert!(HttpResponse::new(304).is_redirection());
		assert!(HttpResponse::new(404).is_client_error());
		assert!(HttpResponse::new(503).is_server_error());

		let unknown = HttpResponse::new(0);
		assert!(!unknown.is_informational());
		assert!(!unknown.is_success());
		assert!(!unknown.is_redirection());
		assert!(!unknown.is_client_error());
		assert!(!unknown.is_server_error());
	}

	#[test]
	fn ok_requires_200_and_no_cancel() {
		assert!(HttpResponse::new(200).is_ok());
		assert!(!HttpResponse::new(204).is_ok());

		let mut canceled = HttpResponse::new(200);
		canceled.canceled = true;
		assert!(!canceled.is_ok());
	}

	#[test]
	fn failure_carries_message() {
		let response = HttpResponse::failed("connection refused", false);
		assert_eq!(response.code, 0);
		assert!(!response.canceled);
		assert_eq!(response.message, "connection refused");
	}

	#[test]
	fn part_accessors() {
		let mut headers = Headers::new();
		headers.set("Content-Type", "image/tiff");
		let part = Part::new(headers, Blob::from(&[1u8, 2, 3]));
		assert_eq!(part.size(), 3);
		assert_eq!(part.mime(), Some("image/tiff"));

		let mut response = HttpResponse::new(200);
		response.parts.push(part);
		assert_eq!(response.first_data().len(), 3);
	}
}
