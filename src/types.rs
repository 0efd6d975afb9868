//! Small shared value types used across the core.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Unix-epoch-seconds timestamp with ISO-8601 `Display`/serde.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Self {
		Timestamp(chrono::Utc::now().timestamp())
	}

	pub fn to_iso(self) -> String {
		chrono::DateTime::from_timestamp(self.0, 0)
			.unwrap_or_else(|| chrono::DateTime::from_timestamp(0, 0).unwrap_or_default())
			.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.to_iso())
	}
}

impl Serialize for Timestamp {
	fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&self.to_iso())
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
		let s = String::deserialize(d)?;
		let parsed = chrono::DateTime::parse_from_rfc3339(&s).map_err(serde::de::Error::custom)?;
		Ok(Timestamp(parsed.timestamp()))
	}
}

/// Strong ETag derived deterministically from `(id, version)`.
pub fn etag_for(id: &str, version: i64) -> String {
	let mut hasher = Sha256::new();
	hasher.update(id.as_bytes());
	hasher.update([0u8]);
	hasher.update(version.to_le_bytes());
	let digest = hasher.finalize();
	let hex: String = digest.iter().take(16).map(|b| format!("{b:02x}")).collect();
	format!("\"{hex}\"")
}

// vim: ts=4
