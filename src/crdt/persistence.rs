//! CRDT Persistence (§4.C): full-state snapshot blob store keyed by `map_id`.

use sqlx::Row;

use crate::error::ClResult;
use crate::storage::StorageEngine;
use crate::types::Timestamp;

#[derive(Debug, Clone)]
pub struct CrdtPersistence {
	storage: StorageEngine,
}

impl CrdtPersistence {
	pub fn new(storage: StorageEngine) -> Self {
		Self { storage }
	}

	/// Upserts the full-state snapshot for `map_id`. Last-writer-wins; the
	/// caller is expected to pass a full-state encoding, not a delta, so a
	/// single surviving row always reconstructs the document.
	pub async fn save_snapshot(&self, map_id: &str, bytes: &[u8]) -> ClResult<()> {
		let now = Timestamp::now().to_iso();
		sqlx::query(
			"INSERT INTO yjs_snapshots (map_id, snapshot, updated_at) VALUES (?, ?, ?)
			 ON CONFLICT(map_id) DO UPDATE SET snapshot = excluded.snapshot, updated_at = excluded.updated_at",
		)
		.bind(map_id)
		.bind(bytes)
		.bind(&now)
		.execute(&self.storage.write_pool)
		.await?;
		Ok(())
	}

	pub async fn load_snapshot(&self, map_id: &str) -> ClResult<Option<Vec<u8>>> {
		let row = sqlx::query("SELECT snapshot FROM yjs_snapshots WHERE map_id = ?")
			.bind(map_id)
			.fetch_optional(&self.storage.read_pool)
			.await?;
		match row {
			Some(row) => {
				let bytes: Vec<u8> = row
					.try_get("snapshot")
					.map_err(|e| crate::error::Error::Internal(e.to_string()))?;
				Ok(Some(bytes))
			}
			None => Ok(None),
		}
	}

	pub async fn delete_snapshot(&self, map_id: &str) -> ClResult<()> {
		sqlx::query("DELETE FROM yjs_snapshots WHERE map_id = ?")
			.bind(map_id)
			.execute(&self.storage.write_pool)
			.await?;
		Ok(())
	}
}

// vim: ts=4
