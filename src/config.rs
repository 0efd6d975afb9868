//! Typed configuration assembled once from the environment (§6 knobs).

use std::path::PathBuf;

use crate::error::{ClResult, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataProvider {
	Json,
	Crdt,
}

#[derive(Debug, Clone)]
pub struct Config {
	pub port: u16,
	pub cors_origin: String,
	pub sqlite_file: PathBuf,
	pub log_level: String,
	pub feature_maps_api: bool,
	pub feature_mcp: bool,
	pub server_sync: bool,
	pub data_provider: DataProvider,
}

fn env_or(key: &str, default: &str) -> String {
	std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
	match std::env::var(key) {
		Ok(v) => matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"),
		Err(_) => default,
	}
}

impl Config {
	/// Reads and validates configuration from the process environment.
	///
	/// Fails fast (rather than silently defaulting) on a value that parses
	/// to something syntactically present but semantically wrong, e.g. a
	/// non-numeric `PORT`.
	pub fn from_env() -> ClResult<Self> {
		let port_str = env_or("PORT", "8080");
		let port: u16 = port_str
			.parse()
			.map_err(|_| Error::Invalid(format!("PORT is not a valid port number: {port_str}")))?;

		let data_provider = match env_or("DATA_PROVIDER", "crdt").as_str() {
			"json" => DataProvider::Json,
			"crdt" => DataProvider::Crdt,
			other => {
				return Err(Error::Invalid(format!(
					"DATA_PROVIDER must be 'json' or 'crdt', got {other}"
				)))
			}
		};

		Ok(Config {
			port,
			cors_origin: env_or("CORS_ORIGIN", "*"),
			sqlite_file: PathBuf::from(env_or("SQLITE_FILE", "./data/mindmeld.sqlite")),
			log_level: env_or("LOG_LEVEL", "info"),
			feature_maps_api: env_bool("FEATURE_MAPS_API", true),
			feature_mcp: env_bool("FEATURE_MCP", false),
			server_sync: env_bool("SERVER_SYNC", true),
			data_provider,
		})
	}
}

// vim: ts=4
