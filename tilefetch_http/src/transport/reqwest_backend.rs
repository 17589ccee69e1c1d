//! Primary transport backend built on `reqwest`.
//!
//! One client handle per transport instance; proxy, timeouts and the user
//! agent are baked in at construction, while credentials, headers and fault
//! injection are applied per request. The body is streamed chunk by chunk
//! so the progress observer can abort mid-transfer.

use super::{Credentials, Transport, TransportEnv, simulate_code};
use crate::{
	hooks::{rewrite_url, transport_tuner},
	multipart::{boundary_from_mime, parse_multipart},
	request::HttpRequest,
	response::{HttpResponse, Part},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use reqwest::{Client, redirect::Policy};
use std::time::{Duration, Instant};
use tilefetch_core::{Blob, progress::Progress};

use crate::headers::Headers;

/// Transport backend driving a `reqwest::Client`.
pub struct ReqwestTransport {
	client: Client,
	proxied: bool,
	last_credentials: Mutex<Option<Credentials>>,
}

impl ReqwestTransport {
	/// Builds the client handle for `env`: proxy resolution, redirect limit
	/// of five, transparent gzip/deflate decoding and relaxed peer-cert
	/// checking (policy is reintroduced by higher layers if needed).
	pub fn new(env: &TransportEnv) -> Result<ReqwestTransport> {
		let proxy = env.resolved_proxy();

		let mut builder = Client::builder()
			.tcp_keepalive(Duration::from_secs(600))
			.redirect(Policy::limited(5))
			.gzip(true)
			.deflate(true)
			.danger_accept_invalid_certs(true)
			.user_agent(env.user_agent.clone());

		if let Some(timeout) = env.timeout {
			builder = builder.timeout(timeout);
		}
		if let Some(connect_timeout) = env.connect_timeout {
			builder = builder.connect_timeout(connect_timeout);
		}

		if let Some(proxy) = &proxy {
			debug!("using proxy {}", proxy.url());
			let mut reqwest_proxy = reqwest::Proxy::all(proxy.url()).context("invalid proxy address")?;
			if let Some(auth) = &proxy.auth {
				reqwest_proxy = reqwest_proxy.basic_auth(&auth.username, &auth.password);
			}
			builder = builder.proxy(reqwest_proxy);
		}

		if let Some(tuner) = transport_tuner() {
			let mut slot = Some(builder);
			tuner.on_initialize(&mut slot);
			builder = slot.take().context("transport tuner dropped the client builder")?;
		}

		Ok(ReqwestTransport {
			client: builder.build()?,
			proxied: proxy.is_some(),
			last_credentials: Mutex::new(None),
		})
	}

	/// Tracks the credentials last applied on this handle and reports
	/// whether reconfiguration is needed.
	fn credentials_changed(&self, next: Option<&Credentials>) -> bool {
		let mut last = self.last_credentials.lock();
		if last.as_ref() == next {
			false
		} else {
			*last = next.cloned();
			true
		}
	}
}

#[async_trait]
impl Transport for ReqwestTransport {
	async fn fetch(&self, request: &HttpRequest, env: &TransportEnv, progress: &dyn Progress) -> HttpResponse {
		let url = rewrite_url(&request.wire_url());
		trace!("GET {url}");

		let start = Instant::now();

		let mut builder = self.client.get(&url);

		// header names go lowercased on the wire; curl's default
		// "Pragma: no-cache" stays off
		for (name, value) in request.headers.iter_wire() {
			if name == "pragma" && value.eq_ignore_ascii_case("no-cache") {
				continue;
			}
			builder = builder.header(name.as_str(), value);
		}

		if let Some(stamp) = request.if_modified_since {
			builder = builder.header("if-modified-since", httpdate::fmt_http_date(stamp));
		}

		let credentials = env.credentials_for(&url);
		if self.credentials_changed(credentials) {
			trace!("switching credentials for {url}");
		}
		if let Some(credentials) = credentials {
			builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
		}

		if let Some(tuner) = transport_tuner() {
			let mut slot = Some(builder);
			tuner.on_fetch(&mut slot);
			match slot.take() {
				Some(tuned) => builder = tuned,
				None => return HttpResponse::failed("transport tuner dropped the request", false),
			}
		}

		let response = match builder.send().await {
			Ok(response) => response,
			Err(error) => {
				return if error.is_timeout() {
					let failed = HttpResponse::failed(error.to_string(), true);
					progress.set_message(&failed.message);
					failed
				} else if error.is_connect() && self.proxied {
					warn!("proxy connect failure: {error}");
					HttpResponse::failed(format!("Proxy connect error {error}"), false)
				} else {
					HttpResponse::failed(error.to_string(), false)
				};
			}
		};

		let code = simulate_code(response.status().as_u16(), env.simulated_code);
		let mut headers = Headers::new();
		for (name, value) in response.headers() {
			if let Ok(value) = value.to_str() {
				headers.add(name.as_str(), value);
			}
		}
		let mime = headers.get("content-type").unwrap_or("").to_string();
		let last_modified = headers.get("last-modified").and_then(|text| httpdate::parse_http_date(text).ok());
		let total = response.content_length().unwrap_or(0);

		// stream the body so cancellation can take effect between chunks
		let mut data: Vec<u8> = Vec::new();
		let mut stream = response.bytes_stream();
		while let Some(chunk) = stream.next().await {
			match chunk {
				Ok(chunk) => {
					data.extend_from_slice(&chunk);
					if progress.report(data.len() as u64, total) || progress.is_canceled() {
						let failed = HttpResponse::failed("transfer canceled by caller", true);
						progress.set_message(&failed.message);
						return failed;
					}
				}
				Err(error) => {
					let failed = HttpResponse::failed(error.to_string(), error.is_timeout());
					progress.set_message(&failed.message);
					return failed;
				}
			}
		}

		let parts = if mime.starts_with("multipart") {
			match boundary_from_mime(&mime).map(|boundary| parse_multipart(&data, &boundary)) {
				Some(Ok(parts)) => parts,
				Some(Err(error)) => return HttpResponse::failed(error.to_string(), false),
				None => return HttpResponse::failed(format!("multipart response without boundary: {mime}"), false),
			}
		} else {
			vec![Part::new(headers, Blob::from(data))]
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
