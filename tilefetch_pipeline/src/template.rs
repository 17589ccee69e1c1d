//! Tile URL templating: `{z}`, `{x}`, `{y}` and the inverted-y `{-y}` are
//! replaced with decimal coordinates in a single pass.

use tilefetch_core::TileKey;

/// Expands a tile URL template for one key. Unknown `{…}` tokens are left
/// verbatim; substitution is single-pass, so substituted values are never
/// re-scanned.
#[must_use]
pub fn expand_template(template: &str, key: &TileKey) -> String {
	let mut out = String::with_capacity(template.len() + 8);
	let mut rest = template;

	while let Some(open) = rest.find('{') {
		out.push_str(&rest[..open]);
		let tail = &rest[open..];
		match tail.find('}') {
			Some(close) => {
				let token = &tail[1..close];
				match token {
					"z" => out.push_str(&key.level.to_string()),
					"x" => out.push_str(&key.x.to_string()),
					"y" => out.push_str(&key.y.to_string()),
					"-y" => out.push_str(&key.flipped_y().to_string()),
					_ => out.push_str(&tail[..=close]),
				}
				rest = &tail[close + 1..];
			}
			None => {
				out.push_str(tail);
				return out;
			}
		}
	}

	out.push_str(rest);
	out
}
