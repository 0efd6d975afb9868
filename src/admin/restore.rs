//! Restore (§4.F): replace the live database from a backup file, with a
//! safety copy of the current database taken first and restored on failure.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::admin::backup::{decrypt_aead, gzip_decompress};
use crate::error::{ClResult, Error};
use crate::storage::StorageEngine;

#[derive(Debug, Clone)]
pub struct RestoreOptions {
	pub backup_path: PathBuf,
	pub decrypt_password: Option<String>,
	pub skip_safety_backup: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreResult {
	pub restored_from: PathBuf,
	pub safety_backup_path: Option<PathBuf>,
	pub duration_ms: u64,
}

/// Finds the most recently modified backup file in `dir`.
pub async fn find_newest(dir: &Path) -> ClResult<PathBuf> {
	let mut newest: Option<(PathBuf, std::time::SystemTime)> = None;
	let mut read_dir = tokio::fs::read_dir(dir).await?;
	while let Some(entry) = read_dir.next_entry().await? {
		let path = entry.path();
		let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();
		if !name.starts_with("mindmeld-backup-") || name.ends_with(".meta.json") {
			continue;
		}
		let modified = entry.metadata().await?.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
		if newest.as_ref().map(|(_, t)| modified > *t).unwrap_or(true) {
			newest = Some((path, modified));
		}
	}
	newest
		.map(|(p, _)| p)
		.ok_or_else(|| Error::NotFound(format!("no backups found in {}", dir.display())))
}

/// Restores the database at `live_path` from a backup file. The database at
/// `live_path` must not be open elsewhere when this runs — the admin binary
/// is expected to be invoked against a stopped server (§4.F scope: offline
/// operations).
pub async fn restore(live_path: &Path, opts: &RestoreOptions) -> ClResult<RestoreResult> {
	let start = std::time::Instant::now();

	let raw = tokio::fs::read(&opts.backup_path).await?;
	let name = opts.backup_path.to_string_lossy();
	let mut plain = raw;
	if name.ends_with(".enc") {
		let password = opts
			.decrypt_password
			.clone()
			.ok_or_else(|| Error::Invalid("backup is encrypted; --password is required".into()))?;
		plain = decrypt_aead(&plain, &password)?;
	}
	if name.ends_with(".gz") || name.contains(".gz.") {
		plain = gzip_decompress(&plain)?;
	}

	let candidate_path = std::env::temp_dir().join(format!("mindmeld-restore-candidate-{}.sqlite", uuid::Uuid::new_v4()));
	tokio::fs::write(&candidate_path, &plain).await?;
	let candidate_engine = StorageEngine::open(&candidate_path).await?;
	let check = candidate_engine.integrity_check().await;
	candidate_engine.close().await;
	if let Err(e) = check {
		tokio::fs::remove_file(&candidate_path).await.ok();
		return Err(Error::Corruption(format!("backup failed integrity check: {e}")));
	}

	let safety_backup_path = if opts.skip_safety_backup || !tokio::fs::try_exists(live_path).await.unwrap_or(false) {
		None
	} else {
		let safety_path = live_path.with_extension("pre-restore.sqlite");
		tokio::fs::copy(live_path, &safety_path).await?;
		Some(safety_path)
	};

	match tokio::fs::copy(&candidate_path, live_path).await {
		Ok(_) => {
			tokio::fs::remove_file(&candidate_path).await.ok();
			Ok(RestoreResult {
				restored_from: opts.backup_path.clone(),
				safety_backup_path,
				duration_ms: start.elapsed().as_millis() as u64,
			})
		}
		Err(e) => {
			if let Some(safety_path) = &safety_backup_path {
				tokio::fs::copy(safety_path, live_path).await.ok();
			}
			tokio::fs::remove_file(&candidate_path).await.ok();
			Err(Error::from(e))
		}
	}
}

// vim: ts=4
