//! Storage Engine (§4.A): embedded SQLite database, pragmas, schema, backup.

use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::{ClResult, Error};

/// Handle to the embedded database. Cheap to clone (pools are internally
/// `Arc`-backed); the single write pool serializes writers the way SQLite's
/// own single-writer model expects, mirroring the read/write pool split the
/// surrounding stack uses for its own sqlite-backed adapters.
#[derive(Debug, Clone)]
pub struct StorageEngine {
	pub(crate) write_pool: SqlitePool,
	pub(crate) read_pool: SqlitePool,
	path: PathBuf,
}

async fn connect_with_journal_fallback(
	path: &Path,
	max_connections: u32,
	read_only: bool,
) -> ClResult<SqlitePool> {
	let base = SqliteConnectOptions::new()
		.filename(path)
		.create_if_missing(!read_only)
		.foreign_keys(true)
		.synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
	let base = if read_only { base.read_only(true) } else { base };

	let wal = base.clone().journal_mode(SqliteJournalMode::Wal);
	match SqlitePoolOptions::new()
		.max_connections(max_connections)
		.connect_with(wal)
		.await
	{
		Ok(pool) => Ok(pool),
		Err(e) => {
			tracing::warn!(error = %e, "WAL journal mode rejected, falling back to rollback journal");
			let fallback = base.journal_mode(SqliteJournalMode::Delete);
			SqlitePoolOptions::new()
				.max_connections(max_connections)
				.connect_with(fallback)
				.await
				.map_err(|e| Error::StorageUnavailable(e.to_string()))
		}
	}
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS maps (
	id TEXT PRIMARY KEY,
	name TEXT NOT NULL,
	version INTEGER NOT NULL,
	created_at TEXT NOT NULL,
	updated_at TEXT NOT NULL,
	state_json TEXT NOT NULL,
	size_bytes INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_maps_updated_at ON maps(updated_at);

CREATE TABLE IF NOT EXISTS yjs_snapshots (
	map_id TEXT PRIMARY KEY,
	snapshot BLOB NOT NULL,
	updated_at TEXT NOT NULL,
	FOREIGN KEY (map_id) REFERENCES maps(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS migrations (
	version TEXT PRIMARY KEY,
	name TEXT NOT NULL,
	applied_at TEXT NOT NULL,
	execution_time_ms INTEGER NOT NULL,
	checksum TEXT NOT NULL
);
"#;

impl StorageEngine {
	/// Opens (creating if missing) the database at `path`, applying pragmas
	/// and the base schema. Directories are created as needed.
	pub async fn open(path: impl AsRef<Path>) -> ClResult<Self> {
		let path = path.as_ref().to_path_buf();
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				tokio::fs::create_dir_all(parent).await?;
			}
		}

		let write_pool = connect_with_journal_fallback(&path, 1, false).await?;
		let read_pool = connect_with_journal_fallback(&path, 5, true).await?;

		for stmt in SCHEMA_SQL.split(';').map(str::trim).filter(|s| !s.is_empty()) {
			sqlx::query(stmt).execute(&write_pool).await?;
		}

		Ok(Self { write_pool, read_pool, path })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn write_pool(&self) -> &SqlitePool {
		&self.write_pool
	}

	pub fn read_pool(&self) -> &SqlitePool {
		&self.read_pool
	}

	/// Runs `PRAGMA integrity_check` on the write connection.
	pub async fn integrity_check(&self) -> ClResult<()> {
		let row = sqlx::query("PRAGMA integrity_check")
			.fetch_one(&self.write_pool)
			.await?;
		let result: String = row.try_get(0).map_err(|_| Error::Corruption("integrity_check returned no rows".into()))?;
		if result == "ok" {
			Ok(())
		} else {
			Err(Error::Corruption(result))
		}
	}

	/// Atomic online copy to `dest_path` via `VACUUM INTO`, safe to run
	/// alongside live writers under WAL.
	pub async fn online_backup(&self, dest_path: impl AsRef<Path>) -> ClResult<()> {
		let dest = dest_path.as_ref();
		if let Some(parent) = dest.parent() {
			if !parent.as_os_str().is_empty() {
				tokio::fs::create_dir_all(parent).await?;
			}
		}
		let dest_str = dest
			.to_str()
			.ok_or_else(|| Error::Invalid("backup destination path is not valid UTF-8".into()))?;
		sqlx::query("VACUUM INTO ?")
			.bind(dest_str)
			.execute(&self.write_pool)
			.await?;
		Ok(())
	}

	/// Closes both pools, releasing file handles.
	pub async fn close(&self) {
		self.write_pool.close().await;
		self.read_pool.close().await;
	}
}

// vim: ts=4
