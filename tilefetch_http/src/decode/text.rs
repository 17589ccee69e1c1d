//! Text decoder for plain, markup and JSON payloads.

use super::{Decoded, Decoder};
use anyhow::{Context, Result};
use tilefetch_core::{Blob, Config};

pub struct TextDecoder;

impl Decoder for TextDecoder {
	fn name(&self) -> &str {
		"text"
	}

	fn extensions(&self) -> &[&str] {
		&["txt", "json", "xml", "html"]
	}

	fn mime_types(&self) -> &[&str] {
		&["text/*", "application/json", "application/xml"]
	}

	fn decode(&self, data: &Blob, _options: &Config) -> Result<Decoded> {
		let text = data.as_str().context("text payload is not valid UTF-8")?;
		Ok(Decoded::Text(text.to_string()))
	}
}
