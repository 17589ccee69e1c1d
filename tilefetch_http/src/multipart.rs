//! This module parses `multipart/*` response bodies into [`Part`]s.
//!
//! Sub-parts are separated by `--<boundary>`, the terminal separator is
//! `--<boundary>--`, and each part's headers end at a blank line. Parsing
//! runs an explicit state machine over the raw bytes; malformed streams are
//! rejected rather than papered over.

use crate::{headers::Headers, response::Part};
use anyhow::{Result, bail};
use tilefetch_core::Blob;

#[derive(Debug, PartialEq)]
enum State {
	ExpectBoundary,
	ReadHeaders,
	ReadBody,
	Done,
}

/// Extracts the `boundary` parameter from a multipart MIME type.
#[must_use]
pub fn boundary_from_mime(mime: &str) -> Option<String> {
	for param in mime.split(';').skip(1) {
		let param = param.trim();
		if let Some(value) = param.strip_prefix("boundary=") {
			let value = value.trim().trim_matches('"');
			if !value.is_empty() {
				return Some(value.to_string());
			}
		}
	}
	None
}

/// Splits a multipart body into its parts.
pub fn parse_multipart(data: &[u8], boundary: &str) -> Result<Vec<Part>> {
	let marker: Vec<u8> = format!("--{boundary}").into_bytes();
	let mut parts = Vec::new();
	let mut headers = Headers::new();
	let mut cursor = 0usize;
	let mut state = State::ExpectBoundary;

	while state != State::Done {
		match state {
			State::ExpectBoundary => {
				while cursor < data.len() && (data[cursor] == b'\r' || data[cursor] == b'\n') {
					cursor += 1;
				}
				if !data[cursor..].starts_with(&marker) {
					bail!("multipart stream does not start with boundary \"--{boundary}\"");
				}
				cursor += marker.len();
				if data[cursor..].starts_with(b"--") {
					state = State::Done;
				} else {
					cursor = skip_line_break(data, cursor)?;
					headers = Headers::new();
					state = State::ReadHeaders;
				}
			}
			State::ReadHeaders => {
				let (line, next) = read_line(data, cursor)?;
				cursor = next;
				if line.is_empty() {
					state = State::ReadBody;
				} else {
					let text = std::str::from_utf8(line)?;
					match text.split_once(':') {
						Some((name, value)) => headers.add(name.trim(), value.trim()),
						None => bail!("malformed part header line \"{text}\""),
					}
				}
			}
			State::ReadBody => {
				let Some(marker_at) = find_boundary(&data[cursor..], &marker) else {
					bail!("multipart stream is missing the terminal boundary \"--{boundary}--\"");
				};
				let mut body_end = cursor + marker_at;
				// the line break before the boundary belongs to the separator
				if body_end > cursor && data[body_end - 1] == b'\n' {
					body_end -= 1;
					if body_end > cursor && data[body_end - 1] == b'\r' {
						body_end -= 1;
					}
				}
				parts.push(Part::new(
					std::mem::take(&mut headers),
					Blob::from(&data[cursor..body_end]),
				));
				cursor += marker_at;
				state = State::ExpectBoundary;
			}
			State::Done => {}
		}
	}

	Ok(parts)
}

fn skip_line_break(data: &[u8], mut cursor: usize) -> Result<usize> {
	if data[cursor..].starts_with(b"\r\n") {
		cursor += 2;
	} else if data[cursor..].starts_with(b"\n") {
		cursor += 1;
	} else {
		bail!("expected a line break after a multipart boundary");
	}
	Ok(cursor)
}

/// Returns one line (without its break) and the cursor past it.
fn read_line(data: &[u8], cursor: usize) -> Result<(&[u8], usize)> {
	let remaining = &data[cursor..];
	let Some(break_at) = remaining.iter().position(|&b| b == b'\n') else {
		bail!("multipart part headers are not terminated");
	};
	let mut line = &remaining[..break_at];
	if line.ends_with(b"\r") {
		line = &line[..line.len() - 1];
	}
	Ok((line, cursor + break_at + 1))
}

/// Byte offset of the next boundary marker that starts a line.
fn find_boundary(data: &[u8], marker: &[u8]) -> Option<usize> {
	if data.starts_with(marker) {
		return Some(0);
	}
	let mut offset = 0;
	while let Some(newline) = data[offset..].iter().position(|&b| b == b'\n') {
		let start = offset + newline + 1;
		if data[start..].starts_with(marker) {
			return Some(start);
		}
		offset = start;
	}
	None
}
