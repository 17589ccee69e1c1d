//! This module defines [`Url`] (an opaque address plus the referrer used to
//! resolve relative paths) and [`HttpRequest`], the single-GET description
//! handed to a transport.

use crate::headers::Headers;
use std::time::SystemTime;

/// An opaque URL string with an optional referrer for resolving relative
/// paths.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Url {
	text: String,
	referrer: Option<String>,
}

impl Url {
	#[must_use]
	pub fn new(text: &str) -> Url {
		Url {
			text: text.to_string(),
			referrer: None,
		}
	}

	#[must_use]
	pub fn with_referrer(text: &str, referrer: &str) -> Url {
		Url {
			text: text.to_string(),
			referrer: Some(referrer.to_string()),
		}
	}

	#[must_use]
	pub fn referrer(&self) -> Option<&str> {
		self.referrer.as_deref()
	}

	/// True when the text carries its own scheme.
	#[must_use]
	pub fn is_absolute(&self) -> bool {
		self.text.contains("://")
	}

	/// The address with a relative path resolved against the referrer's
	/// directory.
	#[must_use]
	pub fn resolved(&self) -> String {
		if self.is_absolute() {
			return self.text.clone();
		}
		match &self.referrer {
			Some(referrer) => {
				let base = match referrer.rfind('/') {
					Some(index) => &referrer[..=index],
					None => "",
				};
				format!("{base}{}", self.text)
			}
			None => self.text.clone(),
		}
	}
}

impl From<&str> for Url {
	fn from(text: &str) -> Self {
		Url::new(text)
	}
}

/// Description of one HTTP GET: address, ordered query parameters, headers
/// and an optional revalidation timestamp.
#[derive(Clone, Debug, Default)]
pub struct HttpRequest {
	url: Url,
	params: Vec<(String, String)>,
	pub headers: Headers,
	pub if_modified_since: Option<SystemTime>,
}

impl HttpRequest {
	#[must_use]
	pub fn new(url: impl Into<Url>) -> HttpRequest {
		HttpRequest {
			url: url.into(),
			..Default::default()
		}
	}

	#[must_use]
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Appends a query parameter; insertion order is preserved on the wire.
	pub fn add_param(&mut self, key: &str, value: impl ToString) {
		self.params.push((key.to_string(), value.to_string()));
	}

	#[must_use]
	pub fn param(&self, key: &str) -> Option<&str> {
		self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
	}

	pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
		self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	/// The final address: resolved URL with parameters appended as
	/// `?k=v&…` in insertion order.
	#[must_use]
	pub fn wire_url(&self) -> String {
		let mut url = self.url.resolved();
		let mut separator = if url.contains('?') { '&' } else { '?' };
		for (key, value) in &self.params {
			url.push(separator);
			url.push_str(key);
			url.push('=');
			url.push_str(value);
			separator = '&';
		}
		url
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn relative_url_resolves_against_referrer() {
		let url = Url::with_referrer("tiles/0/0/0.png", "http://example.com/maps/map.json");
		assert_eq!(url.resolved(), "http://example.com/maps/tiles/0/0/0.png");

		let absolute = Url::with_referrer("http://other.com/a.png", "http://example.com/maps/map.json");
		assert_eq!(absolute.resolved(), "http://other.com/a.png");

		let bare = Url::new("file.png");
		assert_eq!(bare.resolved(), "file.png");
	}

	#[test]
	fn wire_url_preserves_parameter_order() {
		let mut request = HttpRequest::new("http://ex/wms");
		request.add_param("service", "WMS");
		request.add_param("request", "GetMap");
		request.add_param("layers", "base");
		assert_eq!(
			request.wire_url(),
			"http://ex/wms?service=WMS&request=GetMap&layers=base"
		);
	}

	#[test]
	fn wire_url_extends_existing_query() {
		let mut request = HttpRequest::new("http://ex/wms?version=1.1.1");
		request.add_param("service", "WMS");
		assert_eq!(request.wire_url(), "http://ex/wms?version=1.1.1&service=WMS");
	}

	#[test]
	fn wire_url_without_params_is_plain() {
		let request = HttpRequest::new("http://ex/a.png");
		assert_eq!(request.wire_url(), "http://ex/a.png");
	}

	#[test]
	fn param_lookup() {
		let mut request = HttpRequest::new("http://ex/");
		request.add_param("k", "v");
		assert_eq!(request.param("k"), Some("v"));
		assert_eq!(request.param("missing"), None);
	}
}
