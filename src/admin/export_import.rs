//! Export/Import (§4.F): bulk transfer of map rows to/from JSON, CSV, or SQL
//! dump formats, with filtering and a documented merge policy for imports.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::admin::{report_progress, ProgressEvent};
use crate::error::{ClResult, Error};
use crate::maps::validate_mindmeld;
use crate::storage::StorageEngine;
use crate::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
	Json,
	Csv,
	Sql,
}

impl std::str::FromStr for ExportFormat {
	type Err = Error;
	fn from_str(s: &str) -> ClResult<Self> {
		match s.to_ascii_lowercase().as_str() {
			"json" => Ok(Self::Json),
			"csv" => Ok(Self::Csv),
			"sql" => Ok(Self::Sql),
			other => Err(Error::Invalid(format!("unknown export format: {other}"))),
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
	pub name_contains: Option<String>,
	pub updated_after: Option<String>,
	pub updated_before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedMap {
	pub id: String,
	pub name: String,
	pub version: i64,
	pub created_at: String,
	pub updated_at: String,
	pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
	pub path: std::path::PathBuf,
	pub record_count: usize,
}

async fn fetch_filtered(storage: &StorageEngine, filter: &ExportFilter) -> ClResult<Vec<ExportedMap>> {
	let rows = sqlx::query("SELECT id, name, version, created_at, updated_at, state_json FROM maps ORDER BY id")
		.fetch_all(storage.read_pool())
		.await?;

	let mut out = Vec::with_capacity(rows.len());
	for row in rows {
		let name: String = row.try_get("name").map_err(|e| Error::Internal(e.to_string()))?;
		let updated_at: String = row.try_get("updated_at").map_err(|e| Error::Internal(e.to_string()))?;

		if let Some(needle) = &filter.name_contains {
			if !name.contains(needle.as_str()) {
				continue;
			}
		}
		if let Some(after) = &filter.updated_after {
			if updated_at.as_str() < after.as_str() {
				continue;
			}
		}
		if let Some(before) = &filter.updated_before {
			if updated_at.as_str() > before.as_str() {
				continue;
			}
		}

		let state_json: String = row.try_get("state_json").map_err(|e| Error::Internal(e.to_string()))?;
		out.push(ExportedMap {
			id: row.try_get("id").map_err(|e| Error::Internal(e.to_string()))?,
			name,
			version: row.try_get("version").map_err(|e| Error::Internal(e.to_string()))?,
			created_at: row.try_get("created_at").map_err(|e| Error::Internal(e.to_string()))?,
			updated_at,
			data: serde_json::from_str(&state_json)?,
		});
	}
	Ok(out)
}

pub async fn export(storage: &StorageEngine, format: ExportFormat, filter: &ExportFilter, dest: &Path) -> ClResult<ExportResult> {
	let records = fetch_filtered(storage, filter).await?;
	let total = records.len() as u64;

	let body = match format {
		ExportFormat::Json => serde_json::to_vec_pretty(&records)?,
		ExportFormat::Csv => {
			let mut writer = csv::Writer::from_writer(Vec::new());
			for (i, record) in records.iter().enumerate() {
				writer
					.write_record(&[
						record.id.as_str(),
						record.name.as_str(),
						&record.version.to_string(),
						record.created_at.as_str(),
						record.updated_at.as_str(),
						&serde_json::to_string(&record.data)?,
					])
					.map_err(|e| Error::Internal(format!("csv write failed: {e}")))?;
				if i % 100 == 0 {
					report_progress(&ProgressEvent::new(i as u64, total, 0));
				}
			}
			writer
				.into_inner()
				.map_err(|e| Error::Internal(format!("csv flush failed: {e}")))?
		}
		ExportFormat::Sql => {
			let mut sql = String::new();
			for record in &records {
				sql.push_str(&format!(
					"INSERT INTO maps (id, name, version, created_at, updated_at, state_json, size_bytes) VALUES ({}, {}, {}, {}, {}, {}, {});\n",
					sql_quote(&record.id),
					sql_quote(&record.name),
					record.version,
					sql_quote(&record.created_at),
					sql_quote(&record.updated_at),
					sql_quote(&serde_json::to_string(&record.data)?),
					serde_json::to_string(&record.data)?.len(),
				));
			}
			sql.into_bytes()
		}
	};

	tokio::fs::write(dest, &body).await?;
	Ok(ExportResult { path: dest.to_path_buf(), record_count: records.len() })
}

fn sql_quote(s: &str) -> String {
	format!("'{}'", s.replace('\'', "''"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportConflictPolicy {
	Skip,
	Overwrite,
	Merge,
}

impl std::str::FromStr for ImportConflictPolicy {
	type Err = Error;
	fn from_str(s: &str) -> ClResult<Self> {
		match s.to_ascii_lowercase().as_str() {
			"skip" => Ok(Self::Skip),
			"overwrite" => Ok(Self::Overwrite),
			"merge" => Ok(Self::Merge),
			other => Err(Error::Invalid(format!("unknown conflict policy: {other}"))),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
	pub imported: usize,
	pub skipped: usize,
	pub merged: usize,
	pub overwritten: usize,
}

/// Imports a JSON export produced by `export`. On any row failing
/// validation, the whole import is rolled back (the caller is expected to
/// have taken a safety backup beforehand, as the CLI does).
///
/// Conflict resolution when a row with the same `id` already exists:
/// - `Skip`: the existing row is left untouched.
/// - `Overwrite`: the existing row is fully replaced by the imported one.
/// - `Merge`: the existing row's `id` is kept; whichever side has the newer
///   `updated_at` supplies the content, which is re-validated; the stored
///   `version` becomes `max(existing.version, import.version) + 1`.
pub async fn import(storage: &StorageEngine, path: &Path, policy: ImportConflictPolicy) -> ClResult<ImportResult> {
	let bytes = tokio::fs::read(path).await?;
	let records: Vec<ExportedMap> = serde_json::from_slice(&bytes)?;

	for record in &records {
		validate_mindmeld(&record.data)?;
	}

	let mut txn = storage.write_pool().begin().await?;
	let mut result = ImportResult { imported: 0, skipped: 0, merged: 0, overwritten: 0 };

	for record in &records {
		let existing = sqlx::query("SELECT version, updated_at, state_json FROM maps WHERE id = ?")
			.bind(&record.id)
			.fetch_optional(&mut *txn)
			.await?;

		match existing {
			None => {
				let state_json = serde_json::to_string(&record.data)?;
				sqlx::query(
					"INSERT INTO maps (id, name, version, created_at, updated_at, state_json, size_bytes) VALUES (?, ?, ?, ?, ?, ?, ?)",
				)
				.bind(&record.id)
				.bind(&record.name)
				.bind(record.version)
				.bind(&record.created_at)
				.bind(&record.updated_at)
				.bind(&state_json)
				.bind(state_json.len() as i64)
				.execute(&mut *txn)
				.await?;
				result.imported += 1;
			}
			Some(row) => match policy {
				ImportConflictPolicy::Skip => {
					result.skipped += 1;
				}
				ImportConflictPolicy::Overwrite => {
					let state_json = serde_json::to_string(&record.data)?;
					sqlx::query("UPDATE maps SET name = ?, version = ?, updated_at = ?, state_json = ?, size_bytes = ? WHERE id = ?")
						.bind(&record.name)
						.bind(record.version)
						.bind(&record.updated_at)
						.bind(&state_json)
						.bind(state_json.len() as i64)
						.bind(&record.id)
						.execute(&mut *txn)
						.await?;
					result.overwritten += 1;
				}
				ImportConflictPolicy::Merge => {
					let existing_version: i64 = row.try_get("version").map_err(|e| Error::Internal(e.to_string()))?;
					let existing_updated_at: String = row.try_get("updated_at").map_err(|e| Error::Internal(e.to_string()))?;
					let existing_state_json: String = row.try_get("state_json").map_err(|e| Error::Internal(e.to_string()))?;

					// Import wins ties: an import replaying the same write that
					// produced the existing row should still be idempotent.
					let import_wins = record.updated_at.as_str() >= existing_updated_at.as_str();
					let (winning_name, winning_data_json) = if import_wins {
						(record.name.clone(), serde_json::to_string(&record.data)?)
					} else {
						(record.name.clone(), existing_state_json)
					};
					let winning_data: serde_json::Value = serde_json::from_str(&winning_data_json)?;
					validate_mindmeld(&winning_data)?;

					let new_version = existing_version.max(record.version) + 1;
					let now = Timestamp::now().to_iso();
					sqlx::query("UPDATE maps SET name = ?, version = ?, updated_at = ?, state_json = ?, size_bytes = ? WHERE id = ?")
						.bind(&winning_name)
						.bind(new_version)
						.bind(&now)
						.bind(&winning_data_json)
						.bind(winning_data_json.len() as i64)
						.bind(&record.id)
						.execute(&mut *txn)
						.await?;
					result.merged += 1;
				}
			},
		}
	}

	txn.commit().await?;
	Ok(result)
}

// vim: ts=4
