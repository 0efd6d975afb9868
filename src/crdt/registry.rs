//! Document Registry (§4.D): per-map in-memory CRDT replica, owned
//! exclusively here; sessions only ever hold a handle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::Mutex;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

use crate::crdt::persistence::CrdtPersistence;
use crate::crdt::session::SessionHub;
use crate::error::{ClResult, Error};
use crate::maps::MapRepository;

struct Replica {
	doc: Mutex<Doc>,
	refcount: AtomicUsize,
}

/// A handle to a live replica. Holding one keeps the replica pinned in
/// memory; callers must `release` it when done (session close, or a
/// one-shot REST-path touch) so the registry can evict idle replicas.
#[derive(Clone)]
pub struct ReplicaHandle {
	map_id: String,
	replica: Arc<Replica>,
}

impl ReplicaHandle {
	pub fn map_id(&self) -> &str {
		&self.map_id
	}
}

#[derive(Clone)]
pub struct DocumentRegistry {
	replicas: Arc<DashMap<String, Arc<Replica>>>,
	persistence: CrdtPersistence,
	hub: Arc<SessionHub>,
	maps: MapRepository,
}

fn encode_full_state(doc: &Doc) -> Vec<u8> {
	let txn = doc.transact();
	txn.encode_state_as_update_v1(&StateVector::default())
}

impl DocumentRegistry {
	pub fn new(persistence: CrdtPersistence, hub: Arc<SessionHub>, maps: MapRepository) -> Self {
		Self { replicas: Arc::new(DashMap::new()), persistence, hub, maps }
	}

	/// Returns the live replica for `map_id`, restoring it from CRDT
	/// Persistence if a snapshot exists, else starting empty. Increments
	/// the reference count. Creates the backing `maps` row if this is the
	/// first session ever to touch `map_id` (§3 Lifecycle), which is what
	/// lets `apply` below persist a snapshot without violating the
	/// `yjs_snapshots -> maps` foreign key.
	pub async fn acquire(&self, map_id: &str) -> ClResult<ReplicaHandle> {
		if let Some(entry) = self.replicas.get(map_id) {
			entry.refcount.fetch_add(1, Ordering::SeqCst);
			return Ok(ReplicaHandle { map_id: map_id.to_string(), replica: entry.clone() });
		}

		self.maps.ensure_exists(map_id).await?;

		let doc = Doc::new();
		if let Some(snapshot) = self.persistence.load_snapshot(map_id).await? {
			let update = Update::decode_v1(&snapshot)
				.map_err(|e| Error::Corruption(format!("stored snapshot for {map_id} is unreadable: {e}")))?;
			let mut txn = doc.transact_mut();
			txn.apply_update(update)
				.map_err(|e| Error::Corruption(format!("stored snapshot for {map_id} failed to apply: {e}")))?;
			drop(txn);
		}

		let replica = Arc::new(Replica { doc: Mutex::new(doc), refcount: AtomicUsize::new(1) });
		// Race: another task may have inserted concurrently; last writer's
		// Arc is used for this call, but the dashmap entry is whichever
		// landed first, keeping a single in-memory replica per map_id.
		let entry = self
			.replicas
			.entry(map_id.to_string())
			.or_insert_with(|| replica.clone());
		if !Arc::ptr_eq(&entry, &replica) {
			entry.refcount.fetch_add(1, Ordering::SeqCst);
		}
		Ok(ReplicaHandle { map_id: map_id.to_string(), replica: entry.clone() })
	}

	/// Decrements the reference count; evicts the replica once it reaches
	/// zero, provided no apply is currently in flight (its lock is free).
	pub fn release(&self, handle: ReplicaHandle) {
		let prev = handle.replica.refcount.fetch_sub(1, Ordering::SeqCst);
		if prev == 1 {
			self.maybe_evict(&handle.map_id);
		}
	}

	fn maybe_evict(&self, map_id: &str) {
		if let Some(entry) = self.replicas.get(map_id) {
			if entry.refcount.load(Ordering::SeqCst) == 0 {
				if let Ok(_guard) = entry.doc.try_lock() {
					drop(_guard);
					drop(entry);
					self.replicas.remove(map_id);
				}
			}
		}
	}

	/// Applies a binary CRDT update produced by `handle`'s session, then
	/// persists the new full state (the producing side always persists on
	/// ingress; there is no remote-origin re-persist path in a single-node
	/// deployment) and asks the Session Hub to fan it out, excluding the
	/// originating session.
	pub async fn apply(&self, handle: &ReplicaHandle, update_bytes: &[u8], origin_tag: &str) -> ClResult<()> {
		let update = Update::decode_v1(update_bytes)
			.map_err(|e| Error::Invalid(format!("malformed CRDT update: {e}")))?;

		let snapshot = {
			let mut doc = handle.replica.doc.lock().await;
			let mut txn = doc.transact_mut();
			txn.apply_update(update)
				.map_err(|e| Error::Invalid(format!("CRDT update rejected: {e}")))?;
			drop(txn);
			encode_full_state(&doc)
		};

		self.persistence.save_snapshot(&handle.map_id, &snapshot).await?;
		self.hub.broadcast_update(&handle.map_id, Bytes::copy_from_slice(update_bytes), origin_tag.to_string());
		Ok(())
	}

	/// Returns the current full-state encoding of the replica.
	pub async fn snapshot(&self, handle: &ReplicaHandle) -> Vec<u8> {
		let doc = handle.replica.doc.lock().await;
		encode_full_state(&doc)
	}

	/// Forcibly closes the replica (if loaded) and tells the Session Hub to
	/// terminate dependent sessions. Called by the Map Repository path
	/// after a successful REST write.
	pub fn invalidate(&self, map_id: &str) {
		self.replicas.remove(map_id);
		self.hub.invalidate(map_id);
	}
}

// vim: ts=4
