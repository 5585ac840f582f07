//! Shared Ref Container (spec §4.1): every mutable map/set/flag the other
//! components operate on, referentially stable for the engine's lifetime.
//! Grounded on `cloudillo_core::app::App` — a single struct of shared state
//! passed by reference to every handler, rather than process-global
//! statics (spec §9 "Global mutable state").

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use collab_types::ids::{ObjectId, VersionId};
use collab_types::message::IncomingMessage;
use collab_types::sync_context::SyncContext;
use tokio::sync::{Mutex, RwLock};

/// A registered document's context, behind a lock because `SyncContext`
/// gains its user mapping lazily on the first local transaction.
pub type SharedSyncContext = Arc<Mutex<SyncContext>>;

pub struct SharedState {
	/// object-id -> the single registered context for it (invariant 1).
	pub registry: RwLock<HashMap<ObjectId, SharedSyncContext>>,
	/// object-id -> owner count (invariant 6; never negative, P1).
	pub owner_counts: RwLock<HashMap<ObjectId, u32>>,
	/// object-ids whose previous document must be discarded, not flushed,
	/// on teardown (set before destroying a doc mid-reset, spec §4.3 step 3).
	pub skip_flush_on_destroy: RwLock<HashSet<ObjectId>>,
	/// object-id -> running grace-period teardown task.
	pub pending_cleanup: RwLock<HashMap<ObjectId, tokio::task::JoinHandle<()>>>,
	/// object-ids currently undergoing a reset (invariant 2: no registered
	/// context exists for an id in this set).
	pub resetting: RwLock<HashSet<ObjectId>>,
	/// Messages that arrived for a resetting object-id, to replay after the
	/// reset completes (invariant 3, P5).
	pub queued_during_reset: RwLock<HashMap<ObjectId, VecDeque<Arc<IncomingMessage>>>>,
	/// Last incoming version recorded per object-id, used by the reset
	/// abort check (spec §4.3 step 2).
	pub latest_incoming_version: RwLock<HashMap<ObjectId, Option<VersionId>>>,
	/// Per-object-id inbound FIFO drained by one consumer loop each
	/// (invariant/ordering guarantee P3).
	pub incoming_queues: RwLock<HashMap<ObjectId, VecDeque<Arc<IncomingMessage>>>>,
	/// object-ids with an active consumer loop (at most one per id).
	pub processing: RwLock<HashSet<ObjectId>>,
	/// The current authenticated user, if any.
	pub current_user: RwLock<Option<String>>,
	/// Set once on engine disposal; all inbound processing then returns
	/// immediately (spec §5 Cancellation).
	pub disposed: AtomicBool,
}

impl Default for SharedState {
	fn default() -> Self {
		Self::new()
	}
}

impl SharedState {
	pub fn new() -> Self {
		Self {
			registry: RwLock::new(HashMap::new()),
			owner_counts: RwLock::new(HashMap::new()),
			skip_flush_on_destroy: RwLock::new(HashSet::new()),
			pending_cleanup: RwLock::new(HashMap::new()),
			resetting: RwLock::new(HashSet::new()),
			queued_during_reset: RwLock::new(HashMap::new()),
			latest_incoming_version: RwLock::new(HashMap::new()),
			incoming_queues: RwLock::new(HashMap::new()),
			processing: RwLock::new(HashSet::new()),
			current_user: RwLock::new(None),
			disposed: AtomicBool::new(false),
		}
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}

	/// Dispose the engine: stop all inbound processing and drop queued
	/// work. Grace timers are cancelled by the lifecycle manager, which
	/// owns `pending_cleanup`.
	pub async fn dispose(&self) {
		self.disposed.store(true, Ordering::SeqCst);
		self.incoming_queues.write().await.clear();
		self.processing.write().await.clear();
		self.queued_during_reset.write().await.clear();
		self.resetting.write().await.clear();

		let mut cleanups = self.pending_cleanup.write().await;
		for (_, handle) in cleanups.drain() {
			handle.abort();
		}
	}
}

// vim: ts=4
