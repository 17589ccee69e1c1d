//! Alternate transport backend built on the blocking `ureq` agent.
//!
//! The transfer runs on a blocking worker; chunk counts are bridged back
//! over a channel so the async side can poll the progress observer and flip
//! a shared cancel flag the reader checks between chunks.

use super::{Transport, TransportEnv, simulate_code};
use crate::{
	hooks::{rewrite_url, transport_tuner},
	multipart::{boundary_from_mime, parse_multipart},
	request::HttpRequest,
	response::{HttpResponse, Part},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use log::{trace, warn};
use std::{
	io::Read,
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Instant,
};
use tilefetch_core::{Blob, progress::Progress};

use crate::headers::Headers;

const CHUNK_SIZE: usize = 16 * 1024;

/// What the blocking worker hands back.
struct RawResponse {
	code: u16,
	headers: Vec<(String, String)>,
	data: Vec<u8>,
}

enum TransferEvent {
	Total(u64),
	Progress(u64),
}

/// Transport backend driving a blocking `ureq::Agent`.
pub struct UreqTransport {
	agent: ureq::Agent,
	proxied: bool,
}

impl UreqTransport {
	pub fn new(env: &TransportEnv) -> Result<UreqTransport> {
		let proxy = env.resolved_proxy();

		let mut builder = ureq::config::Config::builder()
			.http_status_as_error(false)
			.max_redirects(5)
			.user_agent(env.user_agent.as_str())
			.tls_config(
				ureq::tls::TlsConfig::builder()
					.disable_verification(true)
					.build(),
			);

		if let Some(timeout) = env.timeout {
			builder = builder.timeout_global(Some(timeout));
		}
		if let Some(connect_timeout) = env.connect_timeout {
			builder = builder.timeout_connect(Some(connect_timeout));
		}

		if let Some(proxy) = &proxy {
			let address = match &proxy.auth {
				Some(auth) => format!(
					"http://{}:{}@{}:{}",
					auth.username, auth.password, proxy.host, proxy.port
				),
				None => proxy.url(),
			};
			builder = builder.proxy(Some(ureq::Proxy::new(&address).context("invalid proxy address")?));
		}

		let agent = ureq::Agent::new_with_config(builder.build());
		if let Some(tuner) = transport_tuner() {
			let mut slot = Some(agent.clone());
			tuner.on_initialize(&mut slot);
		}

		Ok(UreqTransport {
			agent,
			proxied: proxy.is_some(),
		})
	}

	fn classify_failure(&self, message: String) -> HttpResponse {
		let lower = message.to_lowercase();
		if lower.contains("timed out") || lower.contains("timeout") {
			HttpResponse::failed(message, true)
		} else if self.proxied {
			warn!("proxy connect failure: {message}");
			HttpResponse::failed(format!("Proxy connect error {message}"), false)
		} else {
			HttpResponse::failed(message, false)
		}
	}
}

#[async_trait]
impl Transport for UreqTransport {
	async fn fetch(&self, request: &HttpRequest, env: &TransportEnv, progress: &dyn Progress) -> HttpResponse {
		let url = rewrite_url(&request.wire_url());
		trace!("GET {url} (ureq)");

		let mut headers: Vec<(String, String)> = request
			.headers
			.iter_wire()
			.filter(|(name, value)| !(name == "pragma" && value.eq_ignore_ascii_case("no-cache")))
			.map(|(name, value)| (name, value.to_string()))
			.collect();

		if let Some(stamp) = request.if_modified_since {
			headers.push(("if-modified-since".to_string(), httpdate::fmt_http_date(stamp)));
		}
		if let Some(credentials) = env.credentials_for(&url) {
			headers.push((
				"authorization".to_string(),
				basic_auth_value(&credentials.username, &credentials.password),
			));
		}

		if let Some(tuner) = transport_tuner() {
			let mut slot = Some(self.agent.clone());
			tuner.on_fetch(&mut slot);
		}

		let start = Instant::now();
		let cancel = Arc::new(AtomicBool::new(false));
		let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<TransferEvent>();

		let agent = self.agent.clone();
		let worker_url = url.clone();
		let worker_cancel = Arc::clone(&cancel);
		let worker = tokio::task::spawn_blocking(move || -> Result<RawResponse, String> {
			let mut builder = agent.get(&worker_url);
			for (name, value) in &headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			let mut response = builder.call().map_err(|error| error.to_string())?;

			let code = response.status().as_u16();
			let response_headers: Vec<(String, String)> = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value
						.to_str()
						.ok()
						.map(|text| (name.as_str().to_string(), text.to_string()))
				})
				.collect();

			let total: u64 = response_headers
				.iter()
				.find(|(name, _)| name == "content-length")
				.and_then(|(_, value)| value.parse().ok())
				.unwrap_or(0);
			let _ = event_tx.send(TransferEvent::Total(total));

			let mut reader = response.body_mut().as_reader();
			let mut data = Vec::new();
			let mut chunk = vec![0u8; CHUNK_SIZE];
			loop {
				if worker_cancel.load(Ordering::Relaxed) {
					return Err("transfer canceled by caller".to_string());
				}
				match reader.read(&mut chunk) {
					Ok(0) => break,
					Ok(count) => {
						data.extend_from_slice(&chunk[..count]);
						let _ = event_tx.send(TransferEvent::Progress(data.len() as u64));
					}
					Err(error) => return Err(error.to_string()),
				}
			}

			Ok(RawResponse {
				code,
				headers: response_headers,
				data,
			})
		});

		// poll the observer while the worker streams; the flag is checked
		// between chunks on the blocking side
		let mut total = 0u64;
		while let Some(event) = event_rx.recv().await {
			match event {
				TransferEvent::Total(value) => total = value,
				TransferEvent::Progress(done) => {
					if progress.report(done, total) || progress.is_canceled() {
						cancel.store(true, Ordering::Relaxed);
					}
				}
			}
		}

		let raw = match worker.await {
			Ok(Ok(raw)) => raw,
			Ok(Err(message)) => {
				if cancel.load(Ordering::Relaxed) {
					let failed = HttpResponse::failed("transfer canceled by caller", true);
					progress.set_message(&failed.message);
					return failed;
				}
				let failed = self.classify_failure(message);
				progress.set_message(&failed.message);
				return failed;
			}
			Err(error) => return HttpResponse::failed(format!("transfer worker failed: {error}"), false),
		};

		if cancel.load(Ordering::Relaxed) {
			let failed = HttpResponse::failed("transfer canceled by caller", true);
			progress.set_message(&failed.message);
			return failed;
		}

		let code = simulate_code(raw.code, env.simulated_code);
		let mut response_headers = Headers::new();
		for (name, value) in &raw.headers {
			response_headers.add(name, value);
		}
		let mime = response_headers.get("content-type").unwrap_or("").to_string();
		let last_modified = response_headers
			.get("last-modified")
			.and_then(|text| httpdate::parse_http_date(text).ok());

		let parts = if mime.starts_with("multipart") {
			match boundary_from_mime(&mime).map(|boundary| parse_multipart(&raw.data, &boundary)) {
				Some(Ok(parts)) => parts,
				Some(Err(error)) => return HttpResponse::failed(error.to_string(), false),
				None => return HttpResponse::failed(format!("multipart response without boundary: {mime}"), false),
			}
		} else {
			vec![Part::new(response_headers, Blob::from(raw.data))]
		};

		HttpResponse {
			code,
			mime,
			duration: start.elapsed(),
			last_modified,
			canceled: false,
			from_cache: false,
			message: String::new(),
			parts,
		}
	}
}

fn basic_auth_value(username: &str, password: &str) -> String {
	format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn basic_auth_header() {
		assert_eq!(basic_auth_value("Aladdin", "open sesame"), "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
	}
}
