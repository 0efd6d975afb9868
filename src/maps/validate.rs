//! MindMeld document validation (§3 invariants, document limits).

use std::collections::HashSet;

use crate::error::{ClResult, Error};

pub const MAX_NOTE_CONTENT: usize = 10_000;
pub const MAX_NOTES: usize = 1_000;
pub const MAX_CONNECTIONS: usize = 2_000;

/// A conservative HTML sniff: markdown is allowed, but anything that looks
/// like a tag is rejected outright rather than sanitized.
fn contains_html(s: &str) -> bool {
	let bytes = s.as_bytes();
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'<' {
			if let Some(&next) = bytes.get(i + 1) {
				if next.is_ascii_alphabetic() || next == b'/' || next == b'!' {
					return true;
				}
			}
		}
		i += 1;
	}
	false
}

/// Validates a MindMeld document against the §3 shape and limits. Unknown
/// top-level fields on notes/connections are rejected (§9 decision).
pub fn validate_mindmeld(data: &serde_json::Value) -> ClResult<()> {
	let obj = data
		.as_object()
		.ok_or_else(|| Error::Invalid("document must be a JSON object".into()))?;

	let notes = obj
		.get("n")
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::Invalid("document must have an 'n' array of notes".into()))?;
	let connections = obj
		.get("c")
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::Invalid("document must have a 'c' array of connections".into()))?;

	if notes.len() > MAX_NOTES {
		return Err(Error::TooLarge(format!(
			"document has {} notes, limit is {MAX_NOTES}",
			notes.len()
		)));
	}
	if connections.len() > MAX_CONNECTIONS {
		return Err(Error::TooLarge(format!(
			"document has {} connections, limit is {MAX_CONNECTIONS}",
			connections.len()
		)));
	}

	let mut note_ids = HashSet::new();
	for note in notes {
		let note = note
			.as_object()
			.ok_or_else(|| Error::Invalid("each note must be an object".into()))?;
		for key in note.keys() {
			if !matches!(key.as_str(), "i" | "c" | "p" | "color") {
				return Err(Error::Invalid(format!("unknown note field '{key}'")));
			}
		}
		let id = note
			.get("i")
			.and_then(|v| v.as_str())
			.ok_or_else(|| Error::Invalid("note missing string id 'i'".into()))?;
		let content = note
			.get("c")
			.and_then(|v| v.as_str())
			.ok_or_else(|| Error::Invalid("note missing string content 'c'".into()))?;
		let pos = note
			.get("p")
			.and_then(|v| v.as_array())
			.ok_or_else(|| Error::Invalid("note missing position 'p'".into()))?;
		if pos.len() != 2 || !pos.iter().all(|v| v.is_number()) {
			return Err(Error::Invalid("note position 'p' must be a 2-element numeric array".into()));
		}
		if content.chars().count() > MAX_NOTE_CONTENT {
			return Err(Error::TooLarge(format!(
				"note '{id}' content is {} characters, limit is {MAX_NOTE_CONTENT}",
				content.chars().count()
			)));
		}
		if contains_html(content) {
			return Err(Error::Invalid(format!("note '{id}' content contains HTML")));
		}
		note_ids.insert(id.to_string());
	}

	let mut conn_identities = HashSet::new();
	for conn in connections {
		let conn = conn
			.as_object()
			.ok_or_else(|| Error::Invalid("each connection must be an object".into()))?;
		for key in conn.keys() {
			if !matches!(key.as_str(), "f" | "t" | "type") {
				return Err(Error::Invalid(format!("unknown connection field '{key}'")));
			}
		}
		let from = conn
			.get("f")
			.and_then(|v| v.as_str())
			.ok_or_else(|| Error::Invalid("connection missing 'f'".into()))?;
		let to = conn
			.get("t")
			.and_then(|v| v.as_str())
			.ok_or_else(|| Error::Invalid("connection missing 't'".into()))?;
		let kind = conn.get("type").and_then(|v| v.as_str()).unwrap_or("arrow");

		if from == to {
			return Err(Error::Invalid(format!("connection {from} -> {to} is self-referential")));
		}

		let identity = (from.to_string(), to.to_string(), kind.to_string());
		if !conn_identities.insert(identity) {
			return Err(Error::Invalid(format!(
				"duplicate connection ({from}, {to}, {kind})"
			)));
		}
	}

	if !obj.get("meta").is_some_and(|v| v.is_object()) {
		return Err(Error::Invalid("document must have a 'meta' object".into()));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn base_doc() -> serde_json::Value {
		json!({"n": [], "c": [], "meta": {"version": 1, "created": "2026-01-01", "modified": "2026-01-01"}})
	}

	#[test]
	fn accepts_empty_document() {
		assert!(validate_mindmeld(&base_doc()).is_ok());
	}

	#[test]
	fn rejects_html_in_note_content() {
		let mut doc = base_doc();
		doc["n"] = json!([{"i": "n1", "c": "<b>bold</b>", "p": [0, 0]}]);
		assert!(matches!(validate_mindmeld(&doc), Err(Error::Invalid(_))));
	}

	#[test]
	fn rejects_self_connection() {
		let mut doc = base_doc();
		doc["n"] = json!([{"i": "n1", "c": "hi", "p": [0, 0]}]);
		doc["c"] = json!([{"f": "n1", "t": "n1"}]);
		assert!(matches!(validate_mindmeld(&doc), Err(Error::Invalid(_))));
	}

	#[test]
	fn accepts_same_endpoints_different_type() {
		let mut doc = base_doc();
		doc["n"] = json!([{"i": "a", "c": "x", "p": [0, 0]}, {"i": "b", "c": "y", "p": [1, 1]}]);
		doc["c"] = json!([
			{"f": "a", "t": "b", "type": "arrow"},
			{"f": "a", "t": "b", "type": "line"}
		]);
		assert!(validate_mindmeld(&doc).is_ok());
	}

	#[test]
	fn rejects_note_content_over_limit() {
		let mut doc = base_doc();
		let content = "x".repeat(super::MAX_NOTE_CONTENT + 1);
		doc["n"] = json!([{"i": "n1", "c": content, "p": [0, 0]}]);
		assert!(matches!(validate_mindmeld(&doc), Err(Error::TooLarge(_))));
	}

	#[test]
	fn accepts_note_content_at_limit() {
		let mut doc = base_doc();
		let content = "x".repeat(super::MAX_NOTE_CONTENT);
		doc["n"] = json!([{"i": "n1", "c": content, "p": [0, 0]}]);
		assert!(validate_mindmeld(&doc).is_ok());
	}

	#[test]
	fn rejects_too_many_notes() {
		let mut doc = base_doc();
		let notes: Vec<_> = (0..super::MAX_NOTES + 1)
			.map(|i| json!({"i": format!("n{i}"), "c": "x", "p": [0, 0]}))
			.collect();
		doc["n"] = json!(notes);
		assert!(matches!(validate_mindmeld(&doc), Err(Error::TooLarge(_))));
	}
}

// vim: ts=4
