//! Context Lifecycle Manager (spec §4.2): register/unregister CRDT-document
//! sync contexts, ref-count owners, and schedule deferred teardown.
//!
//! Grounded on `cloudillo_core::scheduler`'s task-bookkeeping style and
//! AppFlowy's `flowy-document::manager::FlowyDocumentManager`, which keeps
//! a `doc_id -> editor` map and tears an editor down through one path
//! whether closed explicitly or replaced.

use std::sync::Arc;

use collab_types::collab_kind::CollabKind;
use collab_types::doc::{Awareness, CrdtHandle, DocMeta};
use collab_types::ids::{ObjectId, ViewId};
use collab_types::sync_context::SyncContext;
use collab_types::transport::{CollabTransport, OutgoingUpdate};

use crate::prelude::*;
use crate::shared::{SharedState, SharedSyncContext};

/// Default grace period before a zero-owner document's context is torn
/// down (spec §4.2).
pub const DEFAULT_GRACE_MS: u64 = 10_000;

pub struct LifecycleManager {
	shared: Arc<SharedState>,
	transports: Vec<Arc<dyn CollabTransport>>,
}

impl LifecycleManager {
	pub fn new(shared: Arc<SharedState>, transports: Vec<Arc<dyn CollabTransport>>) -> Self {
		Self { shared, transports }
	}

	fn emit_to_transports(&self, update: OutgoingUpdate) {
		for transport in &self.transports {
			if let Err(e) = transport.emit(update.clone()) {
				warn!("failed to emit to transport for {}: {}", update.object_id, e);
			}
		}
	}

	/// Register `doc` under `view_id`/`collab_kind`. See spec §4.2.
	pub async fn register(
		&self,
		doc: Arc<dyn CrdtHandle>,
		view_id: ViewId,
		collab_kind: CollabKind,
		awareness: Option<Awareness>,
	) -> ClResult<SharedSyncContext> {
		let object_id = doc.guid();

		if let Some(existing) = self.registry_get(object_id).await {
			let same_instance = {
				let ctx = existing.lock().await;
				Arc::ptr_eq(&ctx.doc, &doc)
			};
			if same_instance {
				self.bump_owner_count(object_id).await;
				self.cancel_deferred_cleanup(object_id).await;
				return Ok(existing);
			}
			// A different document instance under the same object id: the
			// stale context must go first (invariant 1).
			let flush_pending = !self.shared.skip_flush_on_destroy.write().await.remove(&object_id);
			self.unregister(object_id, flush_pending).await;
		}

		self.cancel_deferred_cleanup(object_id).await;

		let mut meta = DocMeta::new(object_id, view_id, collab_kind);
		meta.sync_bound = true;

		let awareness = match (collab_kind.supports_awareness(), awareness) {
			(true, awareness) => awareness,
			(false, _) => None,
		};

		let doc_for_flush = doc.clone();
		let flush: collab_types::sync_context::FlushFn = Arc::new(move || {
			let doc = doc_for_flush.clone();
			Box::pin(async move { doc.flush().await })
		});
		let doc_for_discard = doc.clone();
		let discard: collab_types::sync_context::DiscardFn =
			Arc::new(move || doc_for_discard.discard_pending_updates());

		let ctx = SyncContext::new(doc.clone(), meta, awareness, flush, discard);
		let ctx = Arc::new(tokio::sync::Mutex::new(ctx));

		self.registry_insert(object_id, ctx.clone()).await;
		self.set_owner_count(object_id, 1).await;

		self.wire_destroy_listener(object_id, doc.clone());
		self.wire_local_update_listener(doc.clone(), object_id, collab_kind);

		// Initial handshake: let the transports/server know this document
		// is now live, so a reconnecting transport re-syncs it immediately.
		self.emit_to_transports(OutgoingUpdate {
			object_id,
			collab_kind,
			data: doc.state_vector(),
		});

		info!("registered sync context for {} ({:?})", object_id, collab_kind);
		Ok(ctx)
	}

	/// Attach a lazy `clientID -> user-id` mapping hook on a Document
	/// context's first local transaction (spec §4.2).
	pub async fn attach_user_mapping_on_first_transaction(
		&self,
		object_id: ObjectId,
		current_user: &str,
	) {
		if let Some(ctx) = self.registry_get(object_id).await {
			let mut ctx = ctx.lock().await;
			if ctx.collab_kind() != CollabKind::Document {
				return;
			}
			let mapping = ctx.ensure_user_mapping().clone();
			if let Some(client_id) = ctx.doc.local_client_id() {
				mapping.record(client_id, current_user.to_string());
			}
		}
	}

	fn wire_destroy_listener(&self, object_id: ObjectId, doc: Arc<dyn CrdtHandle>) {
		let shared = self.shared.clone();
		let transports = self.transports.clone();
		doc.on_destroy(Box::new(move || {
			let shared = shared.clone();
			let transports = transports.clone();
			tokio::spawn(async move {
				// External destroy behaves like a scheduled cleanup that
				// finds zero remaining owners (spec §4.2).
				shared.owner_counts.write().await.insert(object_id, 0);
				let flush_pending =
					!shared.skip_flush_on_destroy.write().await.remove(&object_id);
				teardown(&shared, &transports, object_id, flush_pending).await;
			});
		}));
	}

	fn wire_local_update_listener(
		&self,
		doc: Arc<dyn CrdtHandle>,
		object_id: ObjectId,
		collab_kind: CollabKind,
	) {
		let transports = self.transports.clone();
		doc.on_local_update(Box::new(move |data: &[u8]| {
			let update =
				OutgoingUpdate { object_id, collab_kind, data: data.to_vec() };
			for transport in &transports {
				if let Err(e) = transport.emit(update.clone()) {
					warn!("failed to emit local update for {}: {}", object_id, e);
				}
			}
		}));
	}

	/// Detach observers and drop `object_id` from the registry. Idempotent.
	pub async fn unregister(&self, object_id: ObjectId, flush_pending: bool) {
		teardown(&self.shared, &self.transports, object_id, flush_pending).await;
	}

	/// Decrement the owner count; start a grace timer once it reaches zero
	/// (spec §4.2). Takes `Arc<Self>` by value since the grace timer is a
	/// detached task that must hold its own owning reference.
	pub async fn schedule_deferred_cleanup(self: Arc<Self>, object_id: ObjectId, delay_ms: u64) {
		let remaining = {
			let mut counts = self.shared.owner_counts.write().await;
			let count = counts.entry(object_id).or_insert(0);
			*count = count.saturating_sub(1);
			*count
		};
		if remaining > 0 {
			debug!("{} still has {} owner(s), deferring cleanup", object_id, remaining);
			return;
		}

		self.cancel_deferred_cleanup(object_id).await;

		let this = self.clone();
		let handle = tokio::spawn(async move {
			tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
			let still_zero = this
				.shared
				.owner_counts
				.read()
				.await
				.get(&object_id)
				.copied()
				.unwrap_or(0)
				== 0;
			if !still_zero {
				return;
			}
			this.shared.pending_cleanup.write().await.remove(&object_id);
			let flush_pending =
				!this.shared.skip_flush_on_destroy.write().await.remove(&object_id);
			this.unregister(object_id, flush_pending).await;
		});
		self.shared.pending_cleanup.write().await.insert(object_id, handle);
	}

	/// Whether a grace timer is currently running for `object_id`. Callers
	/// that are about to tear a document down and rebuild it under the same
	/// id capture this before `register` runs again, since `register`
	/// unconditionally cancels any existing timer (spec §4.3 step 5, §4.4
	/// step 5).
	pub async fn has_pending_cleanup(&self, object_id: ObjectId) -> bool {
		self.shared.pending_cleanup.read().await.contains_key(&object_id)
	}

	/// Re-arm a grace timer on `object_id` if one was captured as pending
	/// before the rebuild. Reuses `schedule_deferred_cleanup`: the fresh
	/// context registered with owner count 1 is brought back to 0 and a new
	/// timer started, which is observably the same "carried forward" timer.
	pub async fn carry_forward_cleanup(self: Arc<Self>, had_pending: bool, object_id: ObjectId, delay_ms: u64) {
		if had_pending {
			self.schedule_deferred_cleanup(object_id, delay_ms).await;
		}
	}

	pub async fn cancel_deferred_cleanup(&self, object_id: ObjectId) {
		if let Some(handle) = self.shared.pending_cleanup.write().await.remove(&object_id) {
			handle.abort();
		}
	}

	pub async fn owner_count(&self, object_id: ObjectId) -> u32 {
		self.shared.owner_counts.read().await.get(&object_id).copied().unwrap_or(0)
	}

	pub async fn is_registered(&self, object_id: ObjectId) -> bool {
		self.registry_get(object_id).await.is_some()
	}

	pub async fn get(&self, object_id: ObjectId) -> Option<SharedSyncContext> {
		self.registry_get(object_id).await
	}

	/// Snapshot of every currently registered context, used by the batch
	/// sync utilities (spec §4.6).
	pub async fn all_contexts(&self) -> Vec<(ObjectId, SharedSyncContext)> {
		self.shared.registry.read().await.iter().map(|(id, ctx)| (*id, ctx.clone())).collect()
	}

	/// Find the registered context whose view id is `view_id`. The registry
	/// is keyed by object id; view id coincides with object id for every
	/// collab kind except database views sharing a backing database, so a
	/// linear scan over the (typically small) live-document set is used
	/// rather than maintaining a second index (spec §4.5 step 1).
	pub async fn find_by_view_id(&self, view_id: ViewId) -> Option<(ObjectId, SharedSyncContext)> {
		let registry = self.shared.registry.read().await;
		for (object_id, ctx) in registry.iter() {
			if ctx.lock().await.meta.view_id == view_id {
				return Some((*object_id, ctx.clone()));
			}
		}
		None
	}

	async fn registry_get(&self, object_id: ObjectId) -> Option<SharedSyncContext> {
		self.shared.registry.read().await.get(&object_id).cloned()
	}

	async fn registry_insert(&self, object_id: ObjectId, ctx: SharedSyncContext) {
		self.shared.registry.write().await.insert(object_id, ctx);
	}

	async fn bump_owner_count(&self, object_id: ObjectId) {
		*self.shared.owner_counts.write().await.entry(object_id).or_insert(0) += 1;
	}

	async fn set_owner_count(&self, object_id: ObjectId, value: u32) {
		self.shared.owner_counts.write().await.insert(object_id, value);
	}
}

/// Shared teardown path used by `unregister`, the grace-timer callback, and
/// the doc-destroy listener (spec §4.2 invariant).
async fn teardown(
	shared: &Arc<SharedState>,
	transports: &[Arc<dyn CollabTransport>],
	object_id: ObjectId,
	flush_pending: bool,
) {
	let Some(ctx) = shared.registry.write().await.remove(&object_id) else {
		debug!("unregister({}) is a no-op: not registered", object_id);
		return;
	};

	let ctx_guard = ctx.lock().await;
	if flush_pending {
		if let Err(e) = ctx_guard.flush().await {
			warn!("flush failed while tearing down {}: {}", object_id, e);
		}
	} else {
		ctx_guard.discard_pending_updates();
	}
	ctx_guard.doc.on_destroy(Box::new(|| {}));
	ctx_guard.doc.on_local_update(Box::new(|_| {}));
	drop(ctx_guard);

	let _ = transports; // transports are only needed by the destroy-path wiring, not teardown itself
	shared.owner_counts.write().await.remove(&object_id);
	debug!("torn down sync context for {}", object_id);
}


// vim: ts=4
