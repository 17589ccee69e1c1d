//! Scripted in-memory transport for tests: responses keyed by wire URL,
//! an optional per-call delay and counters for observing traffic.

use super::{Transport, TransportEnv, simulate_code};
use crate::{
	request::HttpRequest,
	response::{HttpResponse, Part},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
	collections::HashMap,
	sync::atomic::{AtomicUsize, Ordering},
	time::{Duration, SystemTime},
};
use tilefetch_core::{Blob, progress::Progress};

use crate::headers::Headers;

/// The request facts a test usually asserts on.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
	pub url: String,
	pub if_modified_since: Option<SystemTime>,
}

/// A transport that serves scripted responses without any network.
#[derive(Default)]
pub struct MockTransport {
	responses: Mutex<HashMap<String, HttpResponse>>,
	fallback: Mutex<Option<HttpResponse>>,
	delay: Option<Duration>,
	calls: AtomicUsize,
	last_request: Mutex<Option<RecordedRequest>>,
}

impl MockTransport {
	#[must_use]
	pub fn new() -> MockTransport {
		MockTransport::default()
	}

	#[must_use]
	pub fn with_delay(mut self, delay: Duration) -> MockTransport {
		self.delay = Some(delay);
		self
	}

	/// Scripts the response for one exact wire URL.
	pub fn respond_with(&self, url: &str, response: HttpResponse) {
		self.responses.lock().insert(url.to_string(), response);
	}

	/// Scripts the response served for any unmatched URL.
	pub fn respond_by_default(&self, response: HttpResponse) {
		*self.fallback.lock() = Some(response);
	}

	/// Number of fetches that reached this transport.
	#[must_use]
	pub fn call_count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	#[must_use]
	pub fn last_request(&self) -> Option<RecordedRequest> {
		self.last_request.lock().clone()
	}

	/// Convenience: a 200 response with one part of `data` and the given
	/// content type.
	#[must_use]
	pub fn ok_response(mime: &str, data: impl Into<Blob>) -> HttpResponse {
		let mut headers = Headers::new();
		headers.set("content-type", mime);
		let mut response = HttpResponse::new(200);
		response.mime = mime.to_string();
		response.parts.push(Part::new(headers, data.into()));
		response
	}
}

#[async_trait]
impl Transport for MockTransport {
	async fn fetch(&self, request: &HttpRequest, env: &TransportEnv, progress: &dyn Progress) -> HttpResponse {
		let url = request.wire_url();
		self.calls.fetch_add(1, Ordering::SeqCst);
		*self.last_request.lock() = Some(RecordedRequest {
			url: url.clone(),
			if_modified_since: request.if_modified_since,
		});

		if let Some(delay) = self.delay {
			tokio::time::sleep(delay).await;
		}

		let scripted = self
			.responses
			.lock()
			.get(&url)
			.cloned()
			.or_else(|| self.fallback.lock().clone())
			.unwrap_or_else(|| HttpResponse::new(404));

		// report the first chunk so cooperative cancellation can kick in
		let total = scripted.first_data().len();
		if progress.report(total, total) || progress.is_canceled() {
			let failed = HttpResponse::failed("transfer canceled by caller", true);
			progress.set_message(&failed.message);
			return failed;
		}

		let mut response = scripted;
		response.code = simulate_code(response.code, env.simulated_code);
		response
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tilefetch_core::progress::{NoProgress, ProgressState};

	#[tokio::test]
	async fn scripted_and_fallback_responses() {
		let transport = MockTransport::new();
		transport.respond_with("http://ex/a.png", MockTransport::ok_response("image/png", &[1u8, 2]));

		let env = TransportEnv::default();
		let response = transport
			.fetch(&HttpRequest::new("http://ex/a.png"), &env, &NoProgress)
			.await;
		assert!(response.is_ok());
		assert_eq!(response.first_data().len(), 2);

		let response = transport
			.fetch(&HttpRequest::new("http://ex/missing"), &env, &NoProgress)
			.await;
		assert_eq!(response.code, 404);
		assert_eq!(transport.call_count(), 2);
	}

	#[tokio::test]
	async fn cancellation_yields_code_zero() {
		let transport = MockTransport::new();
		transport.respond_with("http://ex/a", MockTransport::ok_response("text/plain", "body"));

		let progress = ProgressState::new();
		progress.cancel();
		let response = transport
			.fetch(&HttpRequest::new("http://ex/a"), &TransportEnv::default(), &progress)
			.await;
		assert_eq!(response.code, 0);
		assert!(response.canceled);
		assert!(!response.message.is_empty());
	}

	#[tokio::test]
	async fn records_last_request() {
		let transport = MockTransport::new();
		let mut request = HttpRequest::new("http://ex/b");
		request.add_param("v", "1");
		let _ = transport
			.fetch(&request, &TransportEnv::default(), &NoProgress)
			.await;
		let recorded = transport.last_request().unwrap();
		assert_eq!(recorded.url, "http://ex/b?v=1");
		assert!(recorded.if_modified_since.is_none());
	}
}
