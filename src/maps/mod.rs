//! Map Repository (§4.B): CRUD over the `maps` table with optimistic
//! concurrency and strong ETags.

mod validate;

pub use validate::{validate_mindmeld, MAX_CONNECTIONS, MAX_NOTES, MAX_NOTE_CONTENT};

use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::error::{ClResult, Error};
use crate::storage::StorageEngine;
use crate::types::{etag_for, Timestamp};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MindMeldDoc {
	pub n: Vec<serde_json::Value>,
	pub c: Vec<serde_json::Value>,
	pub meta: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapSummary {
	pub id: String,
	pub name: String,
	pub version: i64,
	pub updated_at: String,
	pub size_bytes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapFull {
	pub id: String,
	pub name: String,
	pub version: i64,
	pub updated_at: String,
	pub data: serde_json::Value,
	#[serde(skip)]
	pub etag: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapWriteResult {
	pub id: String,
	pub version: i64,
	pub updated_at: String,
	#[serde(skip)]
	pub etag: String,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
	pub items: Vec<T>,
	pub next_cursor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MapRepository {
	storage: StorageEngine,
}

impl MapRepository {
	pub fn new(storage: StorageEngine) -> Self {
		Self { storage }
	}

	pub async fn create(&self, name: &str, data: &serde_json::Value) -> ClResult<MapWriteResult> {
		if name.trim().is_empty() {
			return Err(Error::Invalid("name must not be empty".into()));
		}
		validate_mindmeld(data)?;

		let state_json = serde_json::to_string(data)?;
		let size_bytes = state_json.len() as i64;
		let id = uuid::Uuid::new_v4().to_string();
		let now = Timestamp::now().to_iso();

		sqlx::query(
			"INSERT INTO maps (id, name, version, created_at, updated_at, state_json, size_bytes) VALUES (?, ?, 1, ?, ?, ?, ?)",
		)
		.bind(&id)
		.bind(name)
		.bind(&now)
		.bind(&now)
		.bind(&state_json)
		.bind(size_bytes)
		.execute(&self.storage.write_pool)
		.await?;

		Ok(MapWriteResult {
			id: id.clone(),
			version: 1,
			updated_at: now.clone(),
			etag: etag_for(&id, 1),
		})
	}

	pub async fn get(&self, id: &str) -> ClResult<MapFull> {
		let row = sqlx::query("SELECT id, name, version, updated_at, state_json FROM maps WHERE id = ?")
			.bind(id)
			.fetch_optional(&self.storage.read_pool)
			.await?
			.ok_or_else(|| Error::NotFound(format!("map {id} not found")))?;

		let version: i64 = row.try_get("version").map_err(|e| Error::Internal(e.to_string()))?;
		let state_json: String = row.try_get("state_json").map_err(|e| Error::Internal(e.to_string()))?;
		let data: serde_json::Value = serde_json::from_str(&state_json)?;

		Ok(MapFull {
			id: id.to_string(),
			name: row.try_get("name").map_err(|e| Error::Internal(e.to_string()))?,
			version,
			updated_at: row.try_get("updated_at").map_err(|e| Error::Internal(e.to_string()))?,
			data,
			etag: etag_for(id, version),
		})
	}

	pub async fn list(&self, cursor: Option<&str>, limit: i64) -> ClResult<Page<MapSummary>> {
		let limit = limit.clamp(1, 200);
		let rows = if let Some(cursor) = cursor {
			sqlx::query(
				"SELECT id, name, version, updated_at, size_bytes FROM maps WHERE id > ? ORDER BY id LIMIT ?",
			)
			.bind(cursor)
			.bind(limit + 1)
			.fetch_all(&self.storage.read_pool)
			.await?
		} else {
			sqlx::query("SELECT id, name, version, updated_at, size_bytes FROM maps ORDER BY id LIMIT ?")
				.bind(limit + 1)
				.fetch_all(&self.storage.read_pool)
				.await?
		};

		let mut items: Vec<MapSummary> = rows
			.iter()
			.map(|row| {
				Ok::<_, Error>(MapSummary {
					id: row.try_get("id").map_err(|e| Error::Internal(e.to_string()))?,
					name: row.try_get("name").map_err(|e| Error::Internal(e.to_string()))?,
					version: row.try_get("version").map_err(|e| Error::Internal(e.to_string()))?,
					updated_at: row.try_get("updated_at").map_err(|e| Error::Internal(e.to_string()))?,
					size_bytes: row.try_get("size_bytes").map_err(|e| Error::Internal(e.to_string()))?,
				})
			})
			.collect::<ClResult<_>>()?;

		let next_cursor = if items.len() as i64 > limit {
			items.pop().map(|last| last.id)
		} else {
			None
		};

		Ok(Page { items, next_cursor })
	}

	/// Updates `id`, requiring the caller's last-observed `version` to match
	/// the stored one exactly (optimistic concurrency). `name`/`data` are
	/// partial: `None` leaves the existing value untouched.
	pub async fn update(
		&self,
		id: &str,
		expected_version: i64,
		name: Option<&str>,
		data: Option<&serde_json::Value>,
	) -> ClResult<MapWriteResult> {
		if let Some(data) = data {
			validate_mindmeld(data)?;
		}
		if let Some(name) = name {
			if name.trim().is_empty() {
				return Err(Error::Invalid("name must not be empty".into()));
			}
		}

		let mut txn = self.storage.write_pool.begin().await?;

		let row = sqlx::query("SELECT name, version, state_json FROM maps WHERE id = ?")
			.bind(id)
			.fetch_optional(&mut *txn)
			.await?
			.ok_or_else(|| Error::NotFound(format!("map {id} not found")))?;

		let current_version: i64 = row.try_get("version").map_err(|e| Error::Internal(e.to_string()))?;
		if current_version != expected_version {
			return Err(Error::Conflict(format!(
				"expected version {expected_version}, stored version is {current_version}"
			)));
		}

		let new_name: String = match name {
			Some(n) => n.to_string(),
			None => row.try_get("name").map_err(|e| Error::Internal(e.to_string()))?,
		};
		let new_state_json: String = match data {
			Some(d) => serde_json::to_string(d)?,
			None => row.try_get("state_json").map_err(|e| Error::Internal(e.to_string()))?,
		};
		let size_bytes = new_state_json.len() as i64;
		let new_version = current_version + 1;
		let now = Timestamp::now().to_iso();

		sqlx::query(
			"UPDATE maps SET name = ?, version = ?, updated_at = ?, state_json = ?, size_bytes = ? WHERE id = ? AND version = ?",
		)
		.bind(&new_name)
		.bind(new_version)
		.bind(&now)
		.bind(&new_state_json)
		.bind(size_bytes)
		.bind(id)
		.bind(current_version)
		.execute(&mut *txn)
		.await?;

		txn.commit().await?;

		Ok(MapWriteResult {
			id: id.to_string(),
			version: new_version,
			updated_at: now,
			etag: etag_for(id, new_version),
		})
	}

	/// Returns whether a row for `id` exists without fetching its body.
	pub async fn exists(&self, id: &str) -> ClResult<bool> {
		let row = sqlx::query("SELECT 1 FROM maps WHERE id = ?")
			.bind(id)
			.fetch_optional(&self.storage.read_pool)
			.await?;
		Ok(row.is_some())
	}

	/// Creates an empty map row under an explicit id if one doesn't already
	/// exist. Used when a binary session is the first touch of a brand-new
	/// `mapId` (§3 Lifecycle: "created ... by Document Registry on first
	/// binary session for a new id").
	pub async fn ensure_exists(&self, id: &str) -> ClResult<()> {
		let now = Timestamp::now().to_iso();
		let empty = serde_json::json!({"n": [], "c": [], "meta": {"version": 1, "created": now, "modified": now}});
		let state_json = serde_json::to_string(&empty)?;
		let size_bytes = state_json.len() as i64;
		sqlx::query(
			"INSERT OR IGNORE INTO maps (id, name, version, created_at, updated_at, state_json, size_bytes) VALUES (?, ?, 1, ?, ?, ?, ?)",
		)
		.bind(id)
		.bind(id)
		.bind(&now)
		.bind(&now)
		.bind(&state_json)
		.bind(size_bytes)
		.execute(&self.storage.write_pool)
		.await?;
		Ok(())
	}

	pub async fn delete(&self, id: &str) -> ClResult<()> {
		let result = sqlx::query("DELETE FROM maps WHERE id = ?")
			.bind(id)
			.execute(&self.storage.write_pool)
			.await?;
		if result.rows_affected() == 0 {
			return Err(Error::NotFound(format!("map {id} not found")));
		}
		// yjs_snapshots cascades via FOREIGN KEY ON DELETE CASCADE.
		Ok(())
	}
}

// vim: ts=4
