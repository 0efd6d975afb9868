//! Backup (§4.F): timestamped online copy, optional gzip + AEAD encryption,
//! post-copy integrity verification, retention.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ClResult, Error};
use crate::storage::StorageEngine;

#[derive(Debug, Clone)]
pub struct BackupOptions {
	pub dest_dir: PathBuf,
	pub compress: bool,
	pub encrypt_password: Option<String>,
	pub keep_newest: Option<usize>,
	pub delete_older_than_days: Option<u32>,
}

impl Default for BackupOptions {
	fn default() -> Self {
		Self {
			dest_dir: PathBuf::from("./backups"),
			compress: false,
			encrypt_password: None,
			keep_newest: None,
			delete_older_than_days: None,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupResult {
	pub path: PathBuf,
	pub size_bytes: u64,
	pub checksum: String,
	pub duration_ms: u64,
	pub verified: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupSidecar {
	pub format_version: u32,
	pub record_count: i64,
	pub source_path: String,
	pub checksum: String,
	pub compressed: bool,
	pub encrypted: bool,
	pub created_at: String,
}

const SCRYPT_SALT_LEN: usize = 16;
const GCM_NONCE_LEN: usize = 12;

fn derive_key(password: &str, salt: &[u8]) -> ClResult<[u8; 32]> {
	let mut key = [0u8; 32];
	scrypt::scrypt(password.as_bytes(), salt, &scrypt::Params::recommended(), &mut key)
		.map_err(|e| Error::Internal(format!("key derivation failed: {e}")))?;
	Ok(key)
}

fn sha256_hex(bytes: &[u8]) -> String {
	let digest = Sha256::digest(bytes);
	digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn timestamp_compact() -> String {
	chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}

fn random_suffix() -> String {
	use rand::Rng;
	let mut rng = rand::thread_rng();
	(0..8).map(|_| rng.sample(rand::distributions::Alphanumeric) as char).collect()
}

/// Creates a timestamped, optionally compressed/encrypted backup of the
/// live database. Safe to run concurrently with live writers (backed by
/// `VACUUM INTO`, see `StorageEngine::online_backup`).
pub async fn backup(storage: &StorageEngine, opts: &BackupOptions) -> ClResult<BackupResult> {
	let start = std::time::Instant::now();
	tokio::fs::create_dir_all(&opts.dest_dir).await?;

	let tmp_dir = std::env::temp_dir();
	let raw_name = format!("mindmeld-raw-{}.sqlite", uuid::Uuid::new_v4());
	let raw_path = tmp_dir.join(&raw_name);

	storage.online_backup(&raw_path).await?;

	let record_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM maps")
		.fetch_one(storage.read_pool())
		.await?;

	let mut bytes = tokio::fs::read(&raw_path).await?;
	tokio::fs::remove_file(&raw_path).await.ok();

	if opts.compress {
		bytes = gzip_compress(&bytes)?;
	}
	let encrypted = opts.encrypt_password.is_some();
	if let Some(password) = &opts.encrypt_password {
		bytes = encrypt_aead(&bytes, password)?;
	}

	let suffix = match (opts.compress, encrypted) {
		(_, true) => ".enc",
		(true, false) => ".gz",
		(false, false) => "",
	};
	let filename = format!(
		"mindmeld-backup-{}-{}.sqlite{}",
		timestamp_compact(),
		random_suffix(),
		suffix
	);
	let final_path = opts.dest_dir.join(&filename);
	tokio::fs::write(&final_path, &bytes).await?;

	let checksum = sha256_hex(&bytes);

	let verified = verify_backup_bytes(&bytes, opts.compress, opts.encrypt_password.as_deref())
		.await
		.is_ok();
	if !verified {
		tokio::fs::remove_file(&final_path).await.ok();
		return Err(Error::Corruption("backup failed post-copy integrity verification".into()));
	}

	let sidecar = BackupSidecar {
		format_version: 1,
		record_count,
		source_path: storage.path().display().to_string(),
		checksum: checksum.clone(),
		compressed: opts.compress,
		encrypted,
		created_at: crate::types::Timestamp::now().to_iso(),
	};
	let meta_path = PathBuf::from(format!("{}.meta.json", final_path.display()));
	tokio::fs::write(&meta_path, serde_json::to_vec_pretty(&sidecar)?).await?;

	apply_retention(&opts.dest_dir, opts.keep_newest, opts.delete_older_than_days).await?;

	Ok(BackupResult {
		path: final_path,
		size_bytes: bytes.len() as u64,
		checksum,
		duration_ms: start.elapsed().as_millis() as u64,
		verified,
	})
}

fn gzip_compress(data: &[u8]) -> ClResult<Vec<u8>> {
	let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
	encoder.write_all(data)?;
	encoder.finish().map_err(Error::from)
}

pub(crate) fn gzip_decompress(data: &[u8]) -> ClResult<Vec<u8>> {
	let mut decoder = GzDecoder::new(data);
	let mut out = Vec::new();
	decoder.read_to_end(&mut out)?;
	Ok(out)
}

fn encrypt_aead(data: &[u8], password: &str) -> ClResult<Vec<u8>> {
	use rand::RngCore;
	let mut salt = [0u8; SCRYPT_SALT_LEN];
	rand::thread_rng().fill_bytes(&mut salt);
	let key_bytes = derive_key(password, &salt)?;
	let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
	let cipher = Aes256Gcm::new(key);
	let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
	let ciphertext = cipher
		.encrypt(&nonce, data)
		.map_err(|e| Error::Internal(format!("encryption failed: {e}")))?;

	let mut out = Vec::with_capacity(SCRYPT_SALT_LEN + GCM_NONCE_LEN + ciphertext.len());
	out.extend_from_slice(&salt);
	out.extend_from_slice(nonce.as_slice());
	out.extend_from_slice(&ciphertext);
	Ok(out)
}

pub(crate) fn decrypt_aead(data: &[u8], password: &str) -> ClResult<Vec<u8>> {
	if data.len() < SCRYPT_SALT_LEN + GCM_NONCE_LEN {
		return Err(Error::Invalid("encrypted backup is truncated".into()));
	}
	let (salt, rest) = data.split_at(SCRYPT_SALT_LEN);
	let (nonce_bytes, ciphertext) = rest.split_at(GCM_NONCE_LEN);
	let key_bytes = derive_key(password, salt)?;
	let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
	let cipher = Aes256Gcm::new(key);
	let nonce = aes_gcm::Nonce::from_slice(nonce_bytes);
	cipher
		.decrypt(nonce, ciphertext)
		.map_err(|_| Error::Invalid("decryption failed: wrong password or corrupt backup".into()))
}

async fn verify_backup_bytes(bytes: &[u8], compressed: bool, password: Option<&str>) -> ClResult<()> {
	let mut plain = bytes.to_vec();
	if let Some(password) = password {
		plain = decrypt_aead(&plain, password)?;
	}
	if compressed {
		plain = gzip_decompress(&plain)?;
	}

	let tmp_path = std::env::temp_dir().join(format!("mindmeld-verify-{}.sqlite", uuid::Uuid::new_v4()));
	tokio::fs::write(&tmp_path, &plain).await?;
	let engine = StorageEngine::open(&tmp_path).await?;
	let result = engine.integrity_check().await;
	engine.close().await;
	tokio::fs::remove_file(&tmp_path).await.ok();
	result
}

/// Verifies a backup file on disk without restoring it.
pub async fn verify(path: &Path) -> ClResult<()> {
	let bytes = tokio::fs::read(path).await?;
	let compressed = path.to_string_lossy().ends_with(".gz");
	let encrypted = path.to_string_lossy().ends_with(".enc");

	let password = if encrypted {
		Some(
			std::env::var("MINDMELD_BACKUP_PASSWORD")
				.map_err(|_| Error::Invalid("encrypted backup requires MINDMELD_BACKUP_PASSWORD".into()))?,
		)
	} else {
		None
	};

	verify_backup_bytes(&bytes, compressed, password.as_deref()).await
}

/// Runs the retention sweep independently of taking a new backup (used by
/// the `cleanup` CLI subcommand).
pub async fn apply_retention_standalone(
	dir: &Path,
	keep_newest: Option<usize>,
	delete_older_than_days: Option<u32>,
) -> ClResult<()> {
	apply_retention(dir, keep_newest, delete_older_than_days).await
}

async fn apply_retention(dir: &Path, keep_newest: Option<usize>, delete_older_than_days: Option<u32>) -> ClResult<()> {
	let mut entries = Vec::new();
	let mut read_dir = tokio::fs::read_dir(dir).await?;
	while let Some(entry) = read_dir.next_entry().await? {
		let path = entry.path();
		let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();
		if !name.starts_with("mindmeld-backup-") || name.ends_with(".meta.json") {
			continue;
		}
		let metadata = entry.metadata().await?;
		let modified = metadata.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
		entries.push((path, modified));
	}
	entries.sort_by(|a, b| b.1.cmp(&a.1));

	let mut to_delete = Vec::new();
	if let Some(keep) = keep_newest {
		to_delete.extend(entries.iter().skip(keep).map(|(p, _)| p.clone()));
	}
	if let Some(days) = delete_older_than_days {
		let cutoff = std::time::SystemTime::now() - std::time::Duration::from_secs(days as u64 * 86_400);
		for (path, modified) in &entries {
			if *modified < cutoff && !to_delete.contains(path) {
				to_delete.push(path.clone());
			}
		}
	}

	for path in to_delete {
		tokio::fs::remove_file(&path).await.ok();
		let meta_path = PathBuf::from(format!("{}.meta.json", path.display()));
		tokio::fs::remove_file(&meta_path).await.ok();
	}
	Ok(())
}

// vim: ts=4
