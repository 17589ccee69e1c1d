//! Decoder registry: maps content signatures, file extensions and MIME
//! types to decoders producing typed content. There is no default decoder;
//! content nothing matches surfaces as `NoReader` upstream.

pub mod image_decoder;
pub use image_decoder::ImageDecoder;
pub mod text;
pub use text::TextDecoder;

use anyhow::{Context, Result, bail};
use image::DynamicImage;
use std::{any::Any, fmt::Debug, io::Cursor, sync::Arc};
use tilefetch_core::{Blob, Config, TileFormat};

/// Typed content produced by a decoder.
#[derive(Clone)]
pub enum Decoded {
	Image(DynamicImage),
	/// An opaque scene node; consumers downcast to their own node type.
	Node(Arc<dyn Any + Send + Sync>),
	/// An opaque object; consumers downcast.
	Object(Arc<dyn Any + Send + Sync>),
	Text(String),
}

impl Decoded {
	#[must_use]
	pub fn kind(&self) -> &str {
		match self {
			Decoded::Image(_) => "image",
			Decoded::Node(_) => "node",
			Decoded::Object(_) => "object",
			Decoded::Text(_) => "text",
		}
	}

	#[must_use]
	pub fn as_image(&self) -> Option<&DynamicImage> {
		match self {
			Decoded::Image(image) => Some(image),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_text(&self) -> Option<&str> {
		match self {
			Decoded::Text(text) => Some(text),
			_ => None,
		}
	}
}

impl Debug for Decoded {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.kind())
	}
}

/// Turns a byte stream into typed content. Implementations advertise the
/// signatures, extensions and MIME types they handle.
pub trait Decoder: Send + Sync {
	fn name(&self) -> &str;

	/// Checks leading magic bytes.
	fn sniff(&self, _data: &[u8]) -> bool {
		false
	}

	/// Path extensions without the dot, lowercased.
	fn extensions(&self) -> &[&str] {
		&[]
	}

	/// Exact MIME types, or prefix wildcards like `text/*`.
	fn mime_types(&self) -> &[&str] {
		&[]
	}

	fn decode(&self, data: &Blob, options: &Config) -> Result<Decoded>;
}

/// Lowercased extension of a URL path, query string and fragment stripped.
#[must_use]
pub fn extension_of(url: &str) -> Option<String> {
	let path = url.split(['?', '#']).next().unwrap_or(url);
	let name = path.rsplit('/').next().unwrap_or(path);
	let (_, extension) = name.rsplit_once('.')?;
	if extension.is_empty() {
		None
	} else {
		Some(extension.to_lowercase())
	}
}

fn mime_matches(pattern: &str, mime: &str) -> bool {
	if let Some(prefix) = pattern.strip_suffix("*") {
		mime.starts_with(prefix)
	} else {
		mime == pattern
	}
}

/// Ordered collection of decoders with the lookup rules of the read path:
/// content sniff first, then URL extension, then MIME type.
pub struct DecoderRegistry {
	decoders: Vec<Arc<dyn Decoder>>,
}

impl DecoderRegistry {
	#[must_use]
	pub fn new_empty() -> DecoderRegistry {
		DecoderRegistry { decoders: Vec::new() }
	}

	/// Registry with the built-in image and text decoders.
	#[must_use]
	pub fn new_default() -> DecoderRegistry {
		let mut registry = DecoderRegistry::new_empty();
		registry.register(Arc::new(ImageDecoder));
		registry.register(Arc::new(TextDecoder));
		registry
	}

	pub fn register(&mut self, decoder: Arc<dyn Decoder>) {
		self.decoders.push(decoder);
	}

	/// Picks a decoder for the given content, URL and MIME type; `None`
	/// means `NoReader`.
	#[must_use]
	pub fn select(&self, data: &[u8], url: &str, mime: &str) -> Option<Arc<dyn Decoder>> {
		if let Some(decoder) = self.decoders.iter().find(|d| d.sniff(data)) {
			return Some(decoder.clone());
		}
		if let Some(extension) = extension_of(url) {
			if let Some(decoder) = self
				.decoders
				.iter()
				.find(|d| d.extensions().contains(&extension.as_str()))
			{
				return Some(decoder.clone());
			}
		}
		let mime = mime.split(';').next().unwrap_or("").trim();
		if !mime.is_empty() {
			if let Some(decoder) = self
				.decoders
				.iter()
				.find(|d| d.mime_types().iter().any(|pattern| mime_matches(pattern, mime)))
			{
				return Some(decoder.clone());
			}
		}
		None
	}

	/// Encodes a raster image in the given tile format; used by local tile
	/// stores on their write path.
	pub fn encode_image(&self, image: &DynamicImage, format: TileFormat) -> Result<Blob> {
		let image_format = match format {
			TileFormat::JPG => image::ImageFormat::Jpeg,
			TileFormat::PNG => image::ImageFormat::Png,
			TileFormat::TIFF => image::ImageFormat::Tiff,
			TileFormat::WEBP => image::ImageFormat::WebP,
			_ => bail!("tile format \"{format}\" is not a raster format"),
		};
		let mut buffer = Cursor::new(Vec::new());
		image
			.write_to(&mut buffer, image_format)
			.with_context(|| format!("while encoding a {format} tile"))?;
		Ok(Blob::from(buffer.into_inner()))
	}
}

impl Default for DecoderRegistry {
	fn default() -> Self {
		DecoderRegistry::new_default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];

	#[test]
	fn extension_strips_query_and_fragment() {
		assert_eq!(extension_of("http://ex/a.PNG?size=2"), Some("png".to_string()));
		assert_eq!(extension_of("http://ex/a.json#frag"), Some("json".to_string()));
		assert_eq!(extension_of("http://ex/noext"), None);
		assert_eq!(extension_of("http://ex/dir.d/noext"), None);
	}

	#[test]
	fn sniff_takes_precedence() {
		let registry = DecoderRegistry::new_default();
		// PNG magic bytes with a misleading extension and MIME
		let decoder = registry.select(PNG_MAGIC, "http://ex/a.txt", "text/plain").unwrap();
		assert_eq!(decoder.name(), "image");
	}

	#[test]
	fn extension_beats_mime() {
		let registry = DecoderRegistry::new_default();
		let decoder = registry.select(b"not magic", "http://ex/a.png?q=1", "text/plain").unwrap();
		assert_eq!(decoder.name(), "image");
	}

	#[test]
	fn mime_is_last_resort() {
		let registry = DecoderRegistry::new_default();
		let decoder = registry.select(b"plain body", "http://ex/data", "text/plain; charset=utf-8");
		assert_eq!(decoder.unwrap().name(), "text");
	}

	#[test]
	fn nothing_matches_is_none() {
		let registry = DecoderRegistry::new_default();
		assert!(registry.select(b"\x00\x01", "http://ex/data.xyz", "application/x-custom").is_none());
	}

	#[test]
	fn encode_and_reload_png() {
		let registry = DecoderRegistry::new_default();
		let image = DynamicImage::new_rgba8(4, 4);
		let blob = registry.encode_image(&image, TileFormat::PNG).unwrap();
		assert!(blob.as_slice().starts_with(PNG_MAGIC));
		assert!(registry.encode_image(&image, TileFormat::PBF).is_err());
	}
}
