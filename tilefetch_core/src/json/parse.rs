//! Recursive-descent JSON parser producing order-preserving values.

use super::{JsonObject, JsonValue};
use anyhow::{Context, Result, bail};
use std::{iter::Peekable, str::CharIndices};

/// Parses a JSON document.
pub fn parse_json_str(json: &str) -> Result<JsonValue> {
	let mut parser = Parser {
		iter: json.char_indices().peekable(),
	};
	let value = parser
		.parse_value()
		.with_context(|| format!("while parsing JSON '{}'", shorten(json)))?;
	parser.skip_whitespace();
	if let Some((pos, c)) = parser.iter.peek() {
		bail!(
			"unexpected trailing character '{c}' at position {pos} while parsing JSON '{}'",
			shorten(json)
		);
	}
	Ok(value)
}

fn shorten(text: &str) -> String {
	if text.chars().count() > 48 {
		format!("{}…", text.chars().take(48).collect::<String>())
	} else {
		text.to_string()
	}
}

struct Parser<'a> {
	iter: Peekable<CharIndices<'a>>,
}

impl Parser<'_> {
	fn skip_whitespace(&mut self) {
		while matches!(self.iter.peek(), Some((_, c)) if c.is_whitespace()) {
			self.iter.next();
		}
	}

	fn peek(&mut self) -> Result<(usize, char)> {
		self.skip_whitespace();
		match self.iter.peek() {
			Some(entry) => Ok(*entry),
			None => bail!("unexpected end of input"),
		}
	}

	fn expect(&mut self, expected: char) -> Result<()> {
		let (pos, c) = self.peek()?;
		if c != expected {
			bail!("expected '{expected}' but found '{c}' at position {pos}");
		}
		self.iter.next();
		Ok(())
	}

	fn parse_value(&mut self) -> Result<JsonValue> {
		let (pos, c) = self.peek()?;
		match c {
			'{' => self.parse_object(),
			'[' => self.parse_array(),
			'"' => Ok(JsonValue::String(self.parse_string()?)),
			't' => self.parse_tag("true", JsonValue::Boolean(true)),
			'f' => self.parse_tag("false", JsonValue::Boolean(false)),
			'n' => self.parse_tag("null", JsonValue::Null),
			c if c.is_ascii_digit() || c == '-' || c == '.' => self.parse_number(),
			c => bail!("unexpected character '{c}' at position {pos}"),
		}
	}

	fn parse_object(&mut self) -> Result<JsonValue> {
		self.expect('{')?;
		let mut object = JsonObject::new();
		if self.peek()?.1 == '}' {
			self.iter.next();
			return Ok(JsonValue::Object(object));
		}
		loop {
			let key = self.parse_string().context("while parsing an object key")?;
			self.expect(':')?;
			let value = self
				.parse_value()
				.with_context(|| format!("while parsing the value of key \"{key}\""))?;
			object.push(&key, value);
			match self.peek()? {
				(_, ',') => {
					self.iter.next();
				}
				(_, '}') => {
					self.iter.next();
					return Ok(JsonValue::Object(object));
				}
				(pos, c) => bail!("expected ',' or '}}' but found '{c}' at position {pos}"),
			}
		}
	}

	fn parse_array(&mut self) -> Result<JsonValue> {
		self.expect('[')?;
		let mut array = Vec::new();
		if self.peek()?.1 == ']' {
			self.iter.next();
			return Ok(JsonValue::Array(array));
		}
		loop {
			array.push(self.parse_value()?);
			match self.peek()? {
				(_, ',') => {
					self.iter.next();
				}
				(_, ']') => {
					self.iter.next();
					return Ok(JsonValue::Array(array));
				}
				(pos, c) => bail!("expected ',' or ']' but found '{c}' at position {pos}"),
			}
		}
	}

	fn parse_string(&mut self) -> Result<String> {
		self.expect('"')?;
		let mut text = String::new();
		loop {
			match self.iter.next() {
				None => bail!("unterminated string"),
				Some((_, '"')) => return Ok(text),
				Some((pos, '\\')) => match self.iter.next() {
					Some((_, '"')) => text.push('"'),
					Some((_, '\\')) => text.push('\\'),
					Some((_, '/')) => text.push('/'),
					Some((_, 'b')) => text.push('\u{08}'),
					Some((_, 'f')) => text.push('\u{0c}'),
					Some((_, 'n')) => text.push('\n'),
					Some((_, 'r')) => text.push('\r'),
					Some((_, 't')) => text.push('\t'),
					Some((_, 'u')) => {
						let mut hex = String::new();
						for _ in 0..4 {
							match self.iter.next() {
								Some((_, c)) => hex.push(c),
								None => bail!("unterminated unicode escape"),
							}
						}
						let code = u32::from_str_radix(&hex, 16)
							.with_context(|| format!("invalid unicode escape \"\\u{hex}\""))?;
						text.push(char::from_u32(code).unwrap_or('\u{fffd}'));
					}
					Some((pos, c)) => bail!("invalid escape character '{c}' at position {pos}"),
					None => bail!("unterminated escape at position {pos}"),
				},
				Some((_, c)) => text.push(c),
			}
		}
	}

	fn parse_number(&mut self) -> Result<JsonValue> {
		let mut text = String::new();
		while let Some((_, c)) = self.iter.peek() {
			if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
				text.push(*c);
				self.iter.next();
			} else {
				break;
			}
		}
		let value: f64 = text.parse().with_context(|| format!("invalid number \"{text}\""))?;
		Ok(JsonValue::Number(value))
	}

	fn parse_tag(&mut self, tag: &str, value: JsonValue) -> Result<JsonValue> {
		for expected in tag.chars() {
			match self.iter.next() {
				Some((_, c)) if c == expected => {}
				Some((pos, c)) => bail!("unexpected character '{c}' while parsing '{tag}' at position {pos}"),
				None => bail!("unexpected end of input while parsing '{tag}'"),
			}
		}
		Ok(value)
	}
}
