//! This module provides the [`Config`] tree, a generic hierarchical
//! key/value container used for options, metadata and request/response
//! headers throughout the stack.
//!
//! Keys compare case-insensitively, children keep their insertion order and
//! duplicate keys are allowed. Serialization goes through the crate's
//! order-preserving JSON values, so `to_json_string` → [`Config::from_json`]
//! reproduces the tree exactly.
//!
//! # Examples
//!
//! ```
//! use tilefetch_core::Config;
//!
//! let mut config = Config::new("source");
//! config.set("url", "http://example.com/{z}/{x}/{y}.png");
//! config.set_number("timeout", 30.0);
//! assert_eq!(config.get("URL").unwrap(), "http://example.com/{z}/{x}/{y}.png");
//! assert_eq!(config.get_as("timeout", 0i32), 30);
//!
//! let text = config.to_json_string();
//! assert_eq!(config, Config::from_json(&text).unwrap());
//! ```

use crate::json::{JsonObject, JsonValue, parse_json_str};
use anyhow::{Context, Result};
use std::str::FromStr;

/// Reserved JSON key carrying a node's own value when it also has children.
const VALUE_KEY: &str = "$";

/// A recursive key/value tree with ordered children.
#[derive(Clone, Debug, Default)]
pub struct Config {
	key: String,
	value: Option<String>,
	is_number: bool,
	referrer: Option<String>,
	children: Vec<Config>,
}

fn keys_match(a: &str, b: &str) -> bool {
	a.eq_ignore_ascii_case(b)
}

impl Config {
	#[must_use]
	pub fn new(key: &str) -> Config {
		Config {
			key: key.to_string(),
			..Default::default()
		}
	}

	#[must_use]
	pub fn with_value(key: &str, value: impl ToString) -> Config {
		let mut config = Config::new(key);
		config.set_value(value);
		config
	}

	#[must_use]
	pub fn key(&self) -> &str {
		&self.key
	}

	#[must_use]
	pub fn value(&self) -> Option<&str> {
		self.value.as_deref()
	}

	pub fn set_value(&mut self, value: impl ToString) {
		self.value = Some(value.to_string());
		self.is_number = false;
	}

	pub fn set_number_value(&mut self, value: f64) {
		self.value = Some(value.to_string());
		self.is_number = true;
	}

	#[must_use]
	pub fn is_number(&self) -> bool {
		self.is_number
	}

	/// The base path used to resolve relative paths stored in this subtree.
	#[must_use]
	pub fn referrer(&self) -> Option<&str> {
		self.referrer.as_deref()
	}

	pub fn set_referrer(&mut self, referrer: impl ToString) {
		self.referrer = Some(referrer.to_string());
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.value.is_none() && self.children.is_empty()
	}

	/// Replaces the value of the first child named `key`, creating the child
	/// if absent.
	pub fn set(&mut self, key: &str, value: impl ToString) {
		match self.children.iter_mut().find(|c| keys_match(&c.key, key)) {
			Some(child) => child.set_value(value),
			None => self.children.push(Config::with_value(key, value)),
		}
	}

	/// Like [`Config::set`] but marks the value as numeric for serialization.
	pub fn set_number(&mut self, key: &str, value: f64) {
		match self.children.iter_mut().find(|c| keys_match(&c.key, key)) {
			Some(child) => child.set_number_value(value),
			None => {
				let mut child = Config::new(key);
				child.set_number_value(value);
				self.children.push(child);
			}
		}
	}

	/// Appends a new child named `key`, keeping any existing children with
	/// the same name.
	pub fn add(&mut self, key: &str, value: impl ToString) {
		self.children.push(Config::with_value(key, value));
	}

	pub fn add_child(&mut self, child: Config) {
		self.children.push(child);
	}

	/// Value of the first child named `key`.
	#[must_use]
	pub fn get(&self, key: &str) -> Option<&str> {
		self.child(key).and_then(Config::value)
	}

	#[must_use]
	pub fn has(&self, key: &str) -> bool {
		self.child(key).is_some()
	}

	/// First child named `key`.
	#[must_use]
	pub fn child(&self, key: &str) -> Option<&Config> {
		self.children.iter().find(|c| keys_match(&c.key, key))
	}

	/// All children named `key`, in insertion order.
	pub fn children_of<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Config> {
		self.children.iter().filter(move |c| keys_match(&c.key, key))
	}

	/// All children, in insertion order.
	pub fn children(&self) -> impl Iterator<Item = &Config> {
		self.children.iter()
	}

	/// Searches for a descendant named `key`; depth-first when `recursive`.
	#[must_use]
	pub fn find(&self, key: &str, recursive: bool) -> Option<&Config> {
		if let Some(child) = self.child(key) {
			return Some(child);
		}
		if recursive {
			for child in &self.children {
				if let Some(found) = child.find(key, true) {
					return Some(found);
				}
			}
		}
		None
	}

	/// Deep-merges `other` into this tree. Children are matched by key;
	/// matched subtrees merge recursively, unmatched ones are appended.
	pub fn merge(&mut self, other: &Config) {
		if other.value.is_some() {
			self.value = other.value.clone();
			self.is_number = other.is_number;
		}
		for other_child in &other.children {
			match self.children.iter_mut().find(|c| keys_match(&c.key, &other_child.key)) {
				Some(child) => child.merge(other_child),
				None => self.children.push(other_child.clone()),
			}
		}
	}

	/// Returns `self − other`: subtrees that exist identically in `other`
	/// are removed; partially matching subtrees keep only their differences.
	#[must_use]
	pub fn sub(&self, other: &Config) -> Config {
		let mut out = Config::new(&self.key);
		out.referrer = self.referrer.clone();
		if self.value != other.value {
			out.value = self.value.clone();
			out.is_number = self.is_number;
		}
		for child in &self.children {
			match other.children_of(&child.key).next() {
				Some(other_child) if other_child == child => {}
				Some(other_child) => out.children.push(child.sub(other_child)),
				None => out.children.push(child.clone()),
			}
		}
		out
	}

	/// Parses the value of child `key`, falling back on absence or parse
	/// failure.
	#[must_use]
	pub fn get_as<T: FromStr>(&self, key: &str, fallback: T) -> T {
		self
			.get(key)
			.and_then(|text| text.trim().parse().ok())
			.unwrap_or(fallback)
	}

	/// Like [`Config::get_as`], but a trailing `%` divides the number by 100.
	#[must_use]
	pub fn get_percentage(&self, key: &str, fallback: f64) -> f64 {
		match self.get(key) {
			Some(text) => {
				let text = text.trim();
				if let Some(stripped) = text.strip_suffix('%') {
					stripped.trim().parse::<f64>().map(|v| v / 100.0).unwrap_or(fallback)
				} else {
					text.parse().unwrap_or(fallback)
				}
			}
			None => fallback,
		}
	}

	/// Stores a string vector as one comma-delimited value; entries
	/// containing commas are wrapped in dquotes (embedded dquotes doubled).
	pub fn set_vec(&mut self, key: &str, values: &[String]) {
		let encoded: Vec<String> = values
			.iter()
			.map(|value| {
				if value.contains(',') || value.contains('"') {
					format!("\"{}\"", value.replace('"', "\"\""))
				} else {
					value.clone()
				}
			})
			.collect();
		self.set(key, encoded.join(","));
	}

	/// Decodes a value written by [`Config::set_vec`].
	#[must_use]
	pub fn get_vec(&self, key: &str) -> Vec<String> {
		let Some(text) = self.get(key) else {
			return Vec::new();
		};
		let mut values = Vec::new();
		let mut current = String::new();
		let mut quoted = false;
		let mut chars = text.chars().peekable();
		while let Some(c) = chars.next() {
			match c {
				'"' if quoted && chars.peek() == Some(&'"') => {
					current.push('"');
					chars.next();
				}
				'"' => quoted = !quoted,
				',' if !quoted => {
					values.push(std::mem::take(&mut current));
				}
				c => current.push(c),
			}
		}
		values.push(current);
		values
	}

	/// Encodes this node as a JSON value.
	#[must_use]
	pub fn to_json(&self) -> JsonValue {
		if self.children.is_empty() {
			return match &self.value {
				None => JsonValue::Null,
				Some(text) => self.value_to_json(text),
			};
		}
		let mut object = JsonObject::new();
		if let Some(text) = &self.value {
			object.push(VALUE_KEY, self.value_to_json(text));
		}
		for child in &self.children {
			object.push(&child.key, child.to_json());
		}
		JsonValue::Object(object)
	}

	fn value_to_json(&self, text: &str) -> JsonValue {
		if self.is_number {
			if let Ok(number) = text.parse::<f64>() {
				return JsonValue::Number(number);
			}
		}
		JsonValue::String(text.to_string())
	}

	/// Serializes the whole tree as `{"<key>": …}`.
	#[must_use]
	pub fn to_json_string(&self) -> String {
		let mut root = JsonObject::new();
		root.push(&self.key, self.to_json());
		JsonValue::Object(root).stringify()
	}

	/// Parses a tree emitted by [`Config::to_json_string`].
	pub fn from_json(text: &str) -> Result<Config> {
		let value = parse_json_str(text).context("while parsing a Config tree")?;
		let object = value.as_object().context("a Config tree must be a JSON object")?;
		let (key, body) = object
			.iter()
			.next()
			.context("a Config tree must have exactly one root key")?;
		let mut config = Config::new(key);
		config.apply_json(body);
		Ok(config)
	}

	fn apply_json(&mut self, value: &JsonValue) {
		match value {
			JsonValue::Null => {}
			JsonValue::String(text) => {
				self.value = Some(text.clone());
			}
			JsonValue::Number(number) => {
				self.value = Some(number.to_string());
				self.is_number = true;
			}
			JsonValue::Boolean(flag) => {
				self.value = Some(flag.to_string());
			}
			JsonValue::Array(entries) => {
				// arrays from external JSON expand into repeated children
				for entry in entries {
					let mut child = Config::new(&self.key);
					child.apply_json(entry);
					self.children.push(child);
				}
			}
			JsonValue::Object(object) => {
				for (key, entry) in object.iter() {
					if key == VALUE_KEY {
						let mut own = Config::new(VALUE_KEY);
						own.apply_json(entry);
						self.value = own.value;
						self.is_number = own.is_number;
					} else if let JsonValue::Array(items) = entry {
						for item in items {
							let mut child = Config::new(key);
							child.apply_json(item);
							self.children.push(child);
						}
					} else {
						let mut child = Config::new(key);
						child.apply_json(entry);
						self.children.push(child);
					}
				}
			}
		}
	}
}

impl PartialEq for Config {
	/// Structural equality: key (case-insensitive), value, numeric hint and
	/// children in order. The referrer is resolution context, not content.
	fn eq(&self, other: &Self) -> bool {
		keys_match(&self.key, &other.key)
			&& self.value == other.value
			&& self.is_number == other.is_number
			&& self.children == other.children
	}
}
