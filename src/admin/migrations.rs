//! Migrations (§4.F): versioned SQL files applied in order and recorded in
//! the `migrations` table, with optional rollback scripts.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::Row;

use crate::error::{ClResult, Error};
use crate::storage::StorageEngine;
use crate::types::Timestamp;

#[derive(Debug, Clone)]
pub struct Migration {
	pub version: String,
	pub name: String,
	pub up_sql: String,
	pub down_sql: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationRecord {
	pub version: String,
	pub name: String,
	pub applied_at: String,
	pub execution_time_ms: i64,
	pub checksum: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
	pub version: String,
	pub name: String,
	pub applied: bool,
}

fn checksum(sql: &str) -> String {
	let digest = Sha256::digest(sql.as_bytes());
	digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Loads migrations from a directory of paired `<version>_<name>.up.sql` /
/// `<version>_<name>.down.sql` files, sorted by version (lexicographic,
/// so versions should be zero-padded, e.g. `0001`).
pub async fn load_migrations(dir: &Path) -> ClResult<Vec<Migration>> {
	let mut by_version: std::collections::BTreeMap<String, (Option<String>, Option<String>, String)> =
		std::collections::BTreeMap::new();

	let mut read_dir = tokio::fs::read_dir(dir).await?;
	while let Some(entry) = read_dir.next_entry().await? {
		let path = entry.path();
		let file_name = match path.file_name().and_then(|n| n.to_str()) {
			Some(n) => n.to_string(),
			None => continue,
		};

		let (stem, is_up) = if let Some(s) = file_name.strip_suffix(".up.sql") {
			(s.to_string(), true)
		} else if let Some(s) = file_name.strip_suffix(".down.sql") {
			(s.to_string(), false)
		} else {
			continue;
		};

		let Some((version, name)) = stem.split_once('_') else {
			continue;
		};

		let contents = tokio::fs::read_to_string(&path).await?;
		let entry = by_version
			.entry(version.to_string())
			.or_insert_with(|| (None, None, name.to_string()));
		if is_up {
			entry.0 = Some(contents);
		} else {
			entry.1 = Some(contents);
		}
	}

	let mut migrations = Vec::new();
	for (version, (up, down, name)) in by_version {
		let up_sql = up.ok_or_else(|| Error::Invalid(format!("migration {version} is missing its .up.sql file")))?;
		migrations.push(Migration { version, name, up_sql, down_sql: down });
	}
	Ok(migrations)
}

async fn applied_versions(storage: &StorageEngine) -> ClResult<std::collections::HashSet<String>> {
	let rows = sqlx::query("SELECT version FROM migrations").fetch_all(storage.read_pool()).await?;
	rows.into_iter()
		.map(|row| row.try_get::<String, _>("version").map_err(|e| Error::Internal(e.to_string())))
		.collect()
}

/// Applies all pending migrations in version order, each in its own
/// transaction. Stops and returns an error on first failure, leaving
/// already-applied migrations in place.
pub async fn migrate(storage: &StorageEngine, migrations: &[Migration], dry_run: bool) -> ClResult<Vec<MigrationRecord>> {
	let applied = applied_versions(storage).await?;
	let mut records = Vec::new();

	for migration in migrations {
		if applied.contains(&migration.version) {
			continue;
		}
		if dry_run {
			tracing::info!(version = %migration.version, name = %migration.name, "would apply migration (dry run)");
			continue;
		}

		let start = std::time::Instant::now();
		let mut txn = storage.write_pool().begin().await?;
		for stmt in migration.up_sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
			sqlx::query(stmt).execute(&mut *txn).await?;
		}
		let now = Timestamp::now().to_iso();
		let execution_time_ms = start.elapsed().as_millis() as i64;
		let sum = checksum(&migration.up_sql);

		sqlx::query("INSERT INTO migrations (version, name, applied_at, execution_time_ms, checksum) VALUES (?, ?, ?, ?, ?)")
			.bind(&migration.version)
			.bind(&migration.name)
			.bind(&now)
			.bind(execution_time_ms)
			.bind(&sum)
			.execute(&mut *txn)
			.await?;

		txn.commit().await?;
		tracing::info!(version = %migration.version, name = %migration.name, ms = execution_time_ms, "applied migration");

		records.push(MigrationRecord {
			version: migration.version.clone(),
			name: migration.name.clone(),
			applied_at: now,
			execution_time_ms,
			checksum: sum,
		});
	}
	Ok(records)
}

/// Rolls back the most recently applied migration. Fails without mutating
/// anything if that migration has no `.down.sql` script.
pub async fn rollback_last(storage: &StorageEngine, migrations: &[Migration]) -> ClResult<String> {
	let row = sqlx::query("SELECT version FROM migrations ORDER BY applied_at DESC LIMIT 1")
		.fetch_optional(storage.read_pool())
		.await?
		.ok_or_else(|| Error::Invalid("no migrations have been applied".into()))?;
	let version: String = row.try_get("version").map_err(|e| Error::Internal(e.to_string()))?;
	rollback_to_version(storage, migrations, &version).await?;
	Ok(version)
}

/// Rolls back a specific applied migration by version.
pub async fn rollback_to_version(storage: &StorageEngine, migrations: &[Migration], version: &str) -> ClResult<()> {
	let migration = migrations
		.iter()
		.find(|m| m.version == version)
		.ok_or_else(|| Error::Invalid(format!("unknown migration version {version}")))?;
	let down_sql = migration
		.down_sql
		.as_ref()
		.ok_or_else(|| Error::Invalid(format!("migration {version} has no rollback script")))?;

	let mut txn = storage.write_pool().begin().await?;
	for stmt in down_sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
		sqlx::query(stmt).execute(&mut *txn).await?;
	}
	sqlx::query("DELETE FROM migrations WHERE version = ?")
		.bind(version)
		.execute(&mut *txn)
		.await?;
	txn.commit().await?;
	tracing::info!(%version, "rolled back migration");
	Ok(())
}

pub async fn status(storage: &StorageEngine, migrations: &[Migration]) -> ClResult<Vec<MigrationStatus>> {
	let applied = applied_versions(storage).await?;
	Ok(migrations
		.iter()
		.map(|m| MigrationStatus {
			version: m.version.clone(),
			name: m.name.clone(),
			applied: applied.contains(&m.version),
		})
		.collect())
}

pub async fn history(storage: &StorageEngine) -> ClResult<Vec<MigrationRecord>> {
	let rows = sqlx::query("SELECT version, name, applied_at, execution_time_ms, checksum FROM migrations ORDER BY applied_at")
		.fetch_all(storage.read_pool())
		.await?;
	rows.into_iter()
		.map(|row| {
			Ok(MigrationRecord {
				version: row.try_get("version").map_err(|e| Error::Internal(e.to_string()))?,
				name: row.try_get("name").map_err(|e| Error::Internal(e.to_string()))?,
				applied_at: row.try_get("applied_at").map_err(|e| Error::Internal(e.to_string()))?,
				execution_time_ms: row.try_get("execution_time_ms").map_err(|e| Error::Internal(e.to_string()))?,
				checksum: row.try_get("checksum").map_err(|e| Error::Internal(e.to_string()))?,
			})
		})
		.collect()
}

pub fn default_migrations_dir() -> PathBuf {
	PathBuf::from("./migrations")
}

// vim: ts=4
