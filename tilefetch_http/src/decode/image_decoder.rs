//! Raster image decoder backed by the `image` crate.

use super::{Decoded, Decoder};
use anyhow::{Context, Result};
use tilefetch_core::{Blob, Config};

/// Decodes PNG, JPEG, WebP, TIFF and GIF payloads.
pub struct ImageDecoder;

impl Decoder for ImageDecoder {
	fn name(&self) -> &str {
		"image"
	}

	fn sniff(&self, data: &[u8]) -> bool {
		data.starts_with(&[0x89, b'P', b'N', b'G'])
			|| data.starts_with(&[0xff, 0xd8, 0xff])
			|| (data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP")
			|| data.starts_with(b"II*\0")
			|| data.starts_with(b"MM\0*")
			|| data.starts_with(b"GIF8")
	}

	fn extensions(&self) -> &[&str] {
		&["png", "jpg", "jpeg", "webp", "tif", "tiff", "gif"]
	}

	fn mime_types(&self) -> &[&str] {
		&["image/*"]
	}

	fn decode(&self, data: &Blob, _options: &Config) -> Result<Decoded> {
		let image = image::load_from_memory(data.as_slice()).context("while decoding a raster image")?;
		Ok(Decoded::Image(image))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::DynamicImage;
	use std::io::Cursor;

	fn png_bytes() -> Blob {
		let image = DynamicImage::new_rgb8(2, 2);
		let mut buffer = Cursor::new(Vec::new());
		image.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
		Blob::from(buffer.into_inner())
	}

	#[test]
	fn sniffing() {
		let decoder = ImageDecoder;
		assert!(decoder.sniff(png_bytes().as_slice()));
		assert!(decoder.sniff(&[0xff, 0xd8, 0xff, 0xe0]));
		assert!(decoder.sniff(b"II*\0rest"));
		assert!(!decoder.sniff(b"plain text"));
		assert!(!decoder.sniff(b""));
	}

	#[test]
	fn decode_roundtrip() {
		let decoded = ImageDecoder.decode(&png_bytes(), &Config::new("env")).unwrap();
		let image = decoded.as_image().unwrap();
		assert_eq!(image.width(), 2);
		assert_eq!(image.height(), 2);
	}

	#[test]
	fn truncated_payload_fails() {
		let result = ImageDecoder.decode(&Blob::from(&[0x89u8, b'P', b'N', b'G']), &Config::new("env"));
		assert!(result.is_err());
	}
}
