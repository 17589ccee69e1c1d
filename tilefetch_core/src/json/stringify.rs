//! Compact JSON serialization.

use super::JsonValue;

pub fn stringify(json: &JsonValue) -> String {
	match json {
		JsonValue::String(s) => format!("\"{}\"", escape_json_string(s)),
		JsonValue::Number(n) => n.to_string(),
		JsonValue::Boolean(b) => b.to_string(),
		JsonValue::Null => String::from("null"),
		JsonValue::Array(entries) => {
			let inner: Vec<String> = entries.iter().map(stringify).collect();
			format!("[{}]", inner.join(","))
		}
		JsonValue::Object(object) => {
			let inner: Vec<String> = object
				.iter()
				.map(|(key, value)| format!("\"{}\":{}", escape_json_string(key), stringify(value)))
				.collect();
			format!("{{{}}}", inner.join(","))
		}
	}
}

pub fn escape_json_string(input: &str) -> String {
	input
		.chars()
		.map(|c| match c {
			'"' => "\\\"".to_string(),
			'\\' => "\\\\".to_string(),
			'\n' => "\\n".to_string(),
			'\r' => "\\r".to_string(),
			'\t' => "\\t".to_string(),
			'\u{08}' => "\\b".to_string(),
			'\u{0c}' => "\\f".to_string(),
			c if c.is_control() => format!("\\u{:04x}", c as u32),
			c => c.to_string(),
		})
		.collect()
}
