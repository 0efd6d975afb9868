//! Admin Facade (§4.F): offline operations over the Storage Engine, run
//! outside the request path. Exposed to the process as a separate CLI
//! binary (`mindmeld-admin`) so these never compete with the server's
//! request-handling threads.

pub mod backup;
pub mod export_import;
pub mod migrations;
pub mod restore;

use serde::Serialize;

/// Streamed progress for backup/restore/export/import, matching §4.F's
/// `{completed, total, percent, elapsed, estimatedTotal}` shape.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
	pub completed: u64,
	pub total: u64,
	pub percent: f64,
	pub elapsed_ms: u64,
	pub estimated_total_ms: u64,
}

impl ProgressEvent {
	pub fn new(completed: u64, total: u64, elapsed_ms: u64) -> Self {
		let percent = if total == 0 { 100.0 } else { (completed as f64 / total as f64) * 100.0 };
		let estimated_total_ms = if completed == 0 {
			0
		} else {
			((elapsed_ms as f64) * (total as f64 / completed as f64)) as u64
		};
		Self { completed, total, percent, elapsed_ms, estimated_total_ms }
	}
}

/// Writes a line of progress to stderr so stdout stays machine-parseable
/// for structured command output (§6 CLI surface).
pub fn report_progress(event: &ProgressEvent) {
	eprintln!(
		"{:.1}% ({}/{}) elapsed={}ms eta={}ms",
		event.percent, event.completed, event.total, event.elapsed_ms, event.estimated_total_ms
	);
}

// vim: ts=4
