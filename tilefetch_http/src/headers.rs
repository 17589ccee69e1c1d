//! This module provides the [`Headers`] map: an ordered header collection
//! with case-insensitive keys. Names are emitted lowercased on the wire
//! while the original spelling is kept for diagnostics.

use tilefetch_core::Config;

fn names_match(a: &str, b: &str) -> bool {
	a.eq_ignore_ascii_case(b)
}

/// Ordered mapping of header name to value; lookups ignore case.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Headers {
	entries: Vec<(String, String)>,
}

impl Headers {
	#[must_use]
	pub fn new() -> Headers {
		Headers::default()
	}

	/// Value of the first header with this name.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<&str> {
		self
			.entries
			.iter()
			.find(|(n, _)| names_match(n, name))
			.map(|(_, v)| v.as_str())
	}

	#[must_use]
	pub fn contains(&self, name: &str) -> bool {
		self.get(name).is_some()
	}

	/// Replaces the first header with this name, appending if absent.
	pub fn set(&mut self, name: &str, value: impl ToString) {
		match self.entries.iter_mut().find(|(n, _)| names_match(n, name)) {
			Some((_, v)) => *v = value.to_string(),
			None => self.entries.push((name.to_string(), value.to_string())),
		}
	}

	/// Appends a header, keeping existing ones with the same name.
	pub fn add(&mut self, name: &str, value: impl ToString) {
		self.entries.push((name.to_string(), value.to_string()));
	}

	/// Removes every header with this name.
	pub fn remove(&mut self, name: &str) {
		self.entries.retain(|(n, _)| !names_match(n, name));
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
	}

	/// Iterates entries with names lowercased for on-wire emission.
	pub fn iter_wire(&self) -> impl Iterator<Item = (String, &str)> {
		self.entries.iter().map(|(n, v)| (n.to_lowercase(), v.as_str()))
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Captures all entries as children of a Config node named `key`.
	#[must_use]
	pub fn to_config(&self, key: &str) -> Config {
		let mut config = Config::new(key);
		for (name, value) in &self.entries {
			config.add(&name.to_lowercase(), value);
		}
		config
	}

	/// Rebuilds a header map from a Config node written by
	/// [`Headers::to_config`].
	#[must_use]
	pub fn from_config(config: &Config) -> Headers {
		let mut headers = Headers::new();
		for child in config.children() {
			if let Some(value) = child.value() {
				headers.add(child.key(), value);
			}
		}
		headers
	}
}
