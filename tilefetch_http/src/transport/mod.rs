//! Transport layer: the single-GET [`Transport`] contract, the environment
//! it runs under (proxy, credentials, timeouts, fault injection) and the
//! process-global backend factory.
//!
//! Two interchangeable backends ship by default: a reqwest-based one and a
//! blocking ureq-based one. Tests use the scripted [`mock::MockTransport`].

pub mod mock;
pub mod reqwest_backend;
pub mod ureq_backend;

use crate::{request::HttpRequest, response::HttpResponse};
use anyhow::Result;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use lazy_static::lazy_static;
use std::{
	env,
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration,
};
use tilefetch_core::progress::Progress;

/// Basic-auth username and password.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
	pub username: String,
	pub password: String,
}

impl Credentials {
	/// Parses the `user:password` form used by the proxy-auth environment
	/// variable.
	#[must_use]
	pub fn parse(text: &str) -> Option<Credentials> {
		let (username, password) = text.split_once(':')?;
		Some(Credentials {
			username: username.to_string(),
			password: password.to_string(),
		})
	}
}

/// Proxy host, port and optional credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxySettings {
	pub host: String,
	pub port: u16,
	pub auth: Option<Credentials>,
}

impl ProxySettings {
	#[must_use]
	pub fn new(host: &str, port: u16) -> ProxySettings {
		ProxySettings {
			host: host.to_string(),
			port,
			auth: None,
		}
	}

	#[must_use]
	pub fn url(&self) -> String {
		format!("http://{}:{}", self.host, self.port)
	}
}

/// Environment one transport call runs under. Snapshotted once per client;
/// never re-read per request.
#[derive(Clone, Debug)]
pub struct TransportEnv {
	/// Explicit proxy; overrides the process-global and environment ones.
	pub proxy: Option<ProxySettings>,
	/// Basic-auth credentials keyed by URL prefix.
	pub credentials: Vec<(String, Credentials)>,
	/// When set, replaces the real response code on roughly every tenth
	/// request.
	pub simulated_code: Option<u16>,
	pub user_agent: String,
	pub timeout: Option<Duration>,
	pub connect_timeout: Option<Duration>,
}

impl Default for TransportEnv {
	fn default() -> Self {
		TransportEnv {
			proxy: None,
			credentials: Vec::new(),
			simulated_code: None,
			user_agent: default_user_agent(),
			timeout: None,
			connect_timeout: None,
		}
	}
}

impl TransportEnv {
	/// Builds an environment from the process environment variables
	/// (`OSG_CURL_PROXY`, `OSG_CURL_PROXYPORT`, `OSGEARTH_CURL_PROXYAUTH`).
	#[must_use]
	pub fn from_env() -> TransportEnv {
		TransportEnv {
			proxy: proxy_from_env(),
			..Default::default()
		}
	}

	/// The proxy to use, in precedence order: explicit, process-global,
	/// environment.
	#[must_use]
	pub fn resolved_proxy(&self) -> Option<ProxySettings> {
		self.proxy.clone().or_else(global_proxy).or_else(proxy_from_env)
	}

	/// Credentials for the longest matching URL prefix.
	#[must_use]
	pub fn credentials_for(&self, url: &str) -> Option<&Credentials> {
		self
			.credentials
			.iter()
			.filter(|(prefix, _)| url.starts_with(prefix.as_str()))
			.max_by_key(|(prefix, _)| prefix.len())
			.map(|(_, credentials)| credentials)
	}
}

fn proxy_from_env() -> Option<ProxySettings> {
	let host = env::var("OSG_CURL_PROXY").ok()?;
	if host.is_empty() {
		return None;
	}
	let port = env::var("OSG_CURL_PROXYPORT")
		.ok()
		.and_then(|text| text.trim().parse().ok())
		.unwrap_or(8080);
	let auth = env::var("OSGEARTH_CURL_PROXYAUTH")
		.ok()
		.and_then(|text| Credentials::parse(&text));
	Some(ProxySettings {
		host,
		port,
		auth,
	})
}

/// Default user agent, e.g. `osgearth0.3`.
#[must_use]
pub fn default_user_agent() -> String {
	let mut parts = env!("CARGO_PKG_VERSION").split('.');
	let major = parts.next().unwrap_or("0");
	let minor = parts.next().unwrap_or("0");
	format!("osgearth{major}.{minor}")
}

lazy_static! {
	static ref GLOBAL_PROXY: parking_lot::Mutex<Option<ProxySettings>> = parking_lot::Mutex::new(None);
	static ref FACTORY: ArcSwapOption<TransportFactory> = ArcSwapOption::empty();
}

/// Sets the process-global proxy used when a request env has none.
pub fn set_global_proxy(proxy: Option<ProxySettings>) {
	*GLOBAL_PROXY.lock() = proxy;
}

#[must_use]
pub fn global_proxy() -> Option<ProxySettings> {
	GLOBAL_PROXY.lock().clone()
}

/// Exactly one HTTP GET per call.
#[async_trait]
pub trait Transport: Send + Sync {
	async fn fetch(&self, request: &HttpRequest, env: &TransportEnv, progress: &dyn Progress) -> HttpResponse;
}

/// Builds a transport for a given environment.
pub struct TransportFactory {
	build: Box<dyn Fn(&TransportEnv) -> Result<Arc<dyn Transport>> + Send + Sync>,
}

impl TransportFactory {
	pub fn new(build: impl Fn(&TransportEnv) -> Result<Arc<dyn Transport>> + Send + Sync + 'static) -> Self {
		TransportFactory { build: Box::new(build) }
	}
}

/// Replaces the process-global transport factory; `None` restores the
/// default reqwest backend.
pub fn set_transport_factory(factory: Option<TransportFactory>) {
	FACTORY.store(factory.map(Arc::new));
}

/// Creates a transport from the installed factory.
pub fn create_transport(env: &TransportEnv) -> Result<Arc<dyn Transport>> {
	match &*FACTORY.load() {
		Some(factory) => (factory.build)(env),
		None => Ok(Arc::new(reqwest_backend::ReqwestTransport::new(env)?)),
	}
}

static SIMULATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Applies fault injection: with a simulated code configured, roughly one
/// request in ten gets its code replaced. The decision hashes a process
/// counter, so a run's injection pattern is reproducible.
#[must_use]
pub fn simulate_code(real: u16, simulated: Option<u16>) -> u16 {
	match simulated {
		Some(code) if simulation_fires() => code,
		_ => real,
	}
}

fn simulation_fires() -> bool {
	let seed = SIMULATION_COUNTER.fetch_add(1, Ordering::Relaxed);
	// splitmix64 finalizer
	let mut h = seed.wrapping_add(0x9e3779b97f4a7c15);
	h = (h ^ (h >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
	h = (h ^ (h >> 27)).wrapping_mul(0x94d049bb133111eb);
	h ^= h >> 31;
	h % 10 == 0
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn credentials_parse() {
		let credentials = Credentials::parse("alice:s3cret").unwrap();
		assert_eq!(credentials.username, "alice");
		assert_eq!(credentials.password, "s3cret");
		assert!(Credentials::parse("no-colon").is_none());
	}

	#[test]
	fn proxy_url() {
		let proxy = ProxySettings::new("proxy.example.com", 3128);
		assert_eq!(proxy.url(), "http://proxy.example.com:3128");
	}

	#[test]
	fn longest_prefix_wins() {
		let mut env = TransportEnv::default();
		env.credentials.push((
			"http://ex/".to_string(),
			Credentials::parse("broad:1").unwrap(),
		));
		env.credentials.push((
			"http://ex/private/".to_string(),
			Credentials::parse("narrow:2").unwrap(),
		));

		assert_eq!(
			env.credentials_for("http://ex/private/a.png").unwrap().username,
			"narrow"
		);
		assert_eq!(env.credentials_for("http://ex/pub/a.png").unwrap().username, "broad");
		assert!(env.credentials_for("http://other/").is_none());
	}

	#[test]
	fn user_agent_uses_major_minor() {
		let agent = default_user_agent();
		assert!(agent.starts_with("osgearth"));
		assert_eq!(agent.matches('.').count(), 1);
	}

	#[test]
	fn simulation_rate_is_about_one_in_ten() {
		let fired = (0..10_000).filter(|_| simulation_fires()).count();
		assert!((800..1200).contains(&fired), "fired {fired} of 10000");
	}

	#[test]
	fn simulate_code_passthrough_without_config() {
		for _ in 0..100 {
			assert_eq!(simulate_code(200, None), 200);
		}
	}
}
