//! Message Dispatcher (spec §4.3): drains both transports into a uniform
//! per-object-id FIFO, applies messages strictly in order per document, and
//! triggers the reset protocol on version mismatch.
//!
//! The per-object-id single-consumer-loop is grounded on
//! `cloudillo_rtdb::websocket`'s per-connection drain task, adapted from a
//! per-connection guard to a per-object-id one since this dispatcher serves
//! many documents over few transports rather than many connections.

use std::future::Future;
use std::sync::Arc;

use collab_types::cache::{CollabCache, OpenDocOptions};
use collab_types::event_bus::{EventBus, LastUpdatedEvent};
use collab_types::ids::{ObjectId, VersionId};
use collab_types::message::{CrdtMessage, IncomingMessage};
use collab_types::transport::CollabTransport;

use crate::lifecycle::LifecycleManager;
use crate::notifications::NotificationRelay;
use crate::prelude::*;
use crate::rebuild::{rebuild, AwarenessFactory, RebuildRequest};
use crate::shared::{SharedState, SharedSyncContext};

/// Whether an incoming version, compared against the context's adopted
/// version, calls for a plain apply or a reset (spec §4.3 table).
#[derive(Debug, PartialEq, Eq)]
enum Decision {
	Apply,
	Reset,
}

fn decide(local_version: Option<VersionId>, incoming_version: Option<VersionId>) -> Decision {
	match (local_version, incoming_version) {
		(None, None) => Decision::Apply,
		(Some(l), Some(i)) if l == i => Decision::Apply,
		_ => Decision::Reset,
	}
}

/// All fields are themselves cheap-clone handles (`Arc<...>`), so the
/// dispatcher as a whole is cheap to clone into a spawned task rather than
/// needing to live behind its own `Arc`.
#[derive(Clone)]
pub struct Dispatcher {
	shared: Arc<SharedState>,
	lifecycle: Arc<LifecycleManager>,
	cache: Arc<dyn CollabCache>,
	event_bus: Arc<EventBus>,
	notifications: NotificationRelay,
	awareness_factory: AwarenessFactory,
	grace_ms: u64,
}

impl Dispatcher {
	pub fn new(
		shared: Arc<SharedState>,
		lifecycle: Arc<LifecycleManager>,
		cache: Arc<dyn CollabCache>,
		event_bus: Arc<EventBus>,
		notifications: NotificationRelay,
		awareness_factory: AwarenessFactory,
		grace_ms: u64,
	) -> Self {
		Self { shared, lifecycle, cache, event_bus, notifications, awareness_factory, grace_ms }
	}

	/// Watch one transport's latest-message slot for the engine's lifetime.
	/// Spawns its own task; the returned handle is not awaited by callers,
	/// mirroring the "fire and forget per transport" shape of the teacher's
	/// connection-drain tasks.
	pub fn watch_transport(&self, transport: Arc<dyn CollabTransport>) {
		let this = self.clone();
		let mut rx = transport.subscribe();
		tokio::spawn(async move {
			let mut last_seen: Option<Arc<IncomingMessage>> = None;
			loop {
				if this.shared.is_disposed() {
					return;
				}
				if rx.changed().await.is_err() {
					// Transport dropped its sender: nothing more will arrive.
					return;
				}
				let current = rx.borrow_and_update().clone();
				let Some(msg) = current else { continue };
				// Dedup by reference identity (spec §5 multi-tab coordination):
				// the same message object must never be applied twice just
				// because both transports happened to surface it.
				if let Some(prev) = &last_seen {
					if Arc::ptr_eq(prev, &msg) {
						continue;
					}
				}
				last_seen = Some(msg.clone());
				this.handle_incoming(msg).await;
			}
		});
	}

	async fn handle_incoming(&self, msg: Arc<IncomingMessage>) {
		match &*msg {
			IncomingMessage::Notification(n) => {
				self.notifications.relay(n.clone());
			}
			IncomingMessage::Crdt(_) => {
				let Some(object_id) = msg.object_id() else {
					debug!("dropping crdt message with no object id");
					return;
				};
				self.enqueue(object_id, msg).await;
			}
		}
	}

	/// Push `msg` onto `object_id`'s FIFO and ensure exactly one consumer
	/// loop is draining it. The processing-set check and the queue push
	/// happen under the same critical section as the consumer's exit check,
	/// so a message can never be enqueued into a queue whose consumer has
	/// already decided to exit.
	async fn enqueue(&self, object_id: ObjectId, msg: Arc<IncomingMessage>) {
		let mut processing = self.shared.processing.write().await;
		let mut queues = self.shared.incoming_queues.write().await;
		queues.entry(object_id).or_default().push_back(msg);
		if processing.contains(&object_id) {
			return;
		}
		processing.insert(object_id);
		drop(queues);
		drop(processing);

		let this = self.clone();
		tokio::spawn(async move { this.run_consumer(object_id).await });
	}

	async fn run_consumer(&self, object_id: ObjectId) {
		loop {
			if self.shared.is_disposed() {
				self.shared.processing.write().await.remove(&object_id);
				return;
			}

			let next = {
				let mut processing = self.shared.processing.write().await;
				let mut queues = self.shared.incoming_queues.write().await;
				let popped = queues.get_mut(&object_id).and_then(|q| q.pop_front());
				if popped.is_none() {
					processing.remove(&object_id);
				}
				popped
			};

			let Some(msg) = next else { return };
			self.apply_one(object_id, msg).await;
		}
	}

	fn apply_one<'a>(
		&'a self,
		object_id: ObjectId,
		msg: Arc<IncomingMessage>,
	) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
		Box::pin(async move {
			let IncomingMessage::Crdt(ref crdt_msg) = *msg else {
				error!("non-crdt message reached the per-object queue for {}", object_id);
				return;
			};

			if self.shared.is_disposed() {
				return;
			}

			if self.shared.resetting.read().await.contains(&object_id) {
				self.shared
					.queued_during_reset
					.write()
					.await
					.entry(object_id)
					.or_default()
					.push_back(msg.clone());
				return;
			}

			let Some(ctx_arc) = self.lifecycle.get(object_id).await else {
				debug!("no registered context for {}, dropping message", object_id);
				return;
			};

			let incoming_version = crdt_msg.incoming_version();
			self.shared.latest_incoming_version.write().await.insert(object_id, incoming_version);

			let local_version = ctx_arc.lock().await.doc.version();

			match decide(local_version, incoming_version) {
				Decision::Apply => {
					self.apply_to_context(&ctx_arc, crdt_msg).await;
					self.publish_update_info(object_id, crdt_msg).await;
				}
				Decision::Reset => {
					self.run_reset(object_id, ctx_arc, crdt_msg, incoming_version).await;
					self.publish_update_info(object_id, crdt_msg).await;
				}
			}

			self.drain_queued_during_reset(object_id).await;
		})
	}

	async fn apply_to_context(&self, ctx_arc: &SharedSyncContext, msg: &CrdtMessage) {
		let Some(update) = &msg.update else { return };
		let Some(data) = &update.data else { return };
		let ctx = ctx_arc.lock().await;
		if let Err(e) = ctx.doc.apply_update(data) {
			warn!("apply_update failed for {}: {}", msg.object_id, e);
		}
	}

	async fn publish_update_info(&self, object_id: ObjectId, msg: &CrdtMessage) {
		self.event_bus.emit_last_updated(LastUpdatedEvent {
			object_id,
			collab_kind: msg.collab_kind,
			published_at: msg.published_at(),
		});
	}

	/// Reset sequence, spec §4.3 steps 2-7. Step 1 (recording `V_in`) already
	/// happened in the caller.
	async fn run_reset(
		&self,
		object_id: ObjectId,
		old_ctx: SharedSyncContext,
		triggering_msg: &CrdtMessage,
		v_in: Option<VersionId>,
	) {
		// Step 2: abort check.
		let still_active = match self.lifecycle.get(object_id).await {
			Some(c) => Arc::ptr_eq(&c, &old_ctx),
			None => false,
		};
		let still_current_version = self
			.shared
			.latest_incoming_version
			.read()
			.await
			.get(&object_id)
			.copied()
			.flatten()
			== v_in;

		if !still_active || !still_current_version || self.shared.is_disposed() {
			if let Some(active_ctx) = self.lifecycle.get(object_id).await {
				let local_version = active_ctx.lock().await.doc.version();
				if decide(local_version, v_in) == Decision::Apply {
					self.apply_to_context(&active_ctx, triggering_msg).await;
				}
			}
			debug!("reset for {} aborted: superseded", object_id);
			return;
		}

		let had_pending_cleanup = self.lifecycle.has_pending_cleanup(object_id).await;
		let (view_id, collab_kind, local_version, old_snapshot) = {
			let ctx = old_ctx.lock().await;
			(ctx.meta.view_id, ctx.meta.collab_kind, ctx.doc.version(), ctx.doc.snapshot())
		};

		// Step 3.
		old_ctx.lock().await.doc.emit_reset();
		old_ctx.lock().await.discard_pending_updates();
		self.shared.skip_flush_on_destroy.write().await.insert(object_id);
		self.shared.resetting.write().await.insert(object_id);
		old_ctx.lock().await.doc.destroy();
		self.lifecycle.unregister(object_id, false).await;

		// Step 4.
		let opts = reset_open_options(v_in, local_version, self.current_user().await);
		let cache = self.cache.clone();
		let rehydrate_snapshot = old_snapshot;
		let rehydrate_version = v_in;
		let open = Box::pin(async move {
			match cache.open_collab_db(object_id, opts).await {
				Ok(doc) => Ok(doc),
				Err(e) => {
					warn!("cache open failed during reset for {}, rehydrating in memory: {}", object_id, e);
					cache.rehydrate_in_memory(object_id, rehydrate_snapshot, rehydrate_version).await
				}
			}
		});

		let request = RebuildRequest {
			object_id,
			view_id,
			collab_kind,
			had_pending_cleanup,
			grace_ms: self.grace_ms,
			is_external_revert: true,
		};

		match rebuild(&self.lifecycle, &self.event_bus, &self.awareness_factory, open, request).await {
			Ok(outcome) => {
				if let Some(ctx_arc) = self.lifecycle.get(object_id).await {
					self.apply_to_context(&ctx_arc, triggering_msg).await;
				}
				let _ = outcome;
			}
			Err(e) => {
				error!("reset rebuild failed for {}: {}", object_id, e);
			}
		}

		// Step 7 (set-membership half; replay happens in drain_queued_during_reset).
		self.shared.resetting.write().await.remove(&object_id);
	}

	/// Public entry point for callers outside the dispatcher (the revert
	/// controller) that have just cleared `resetting` for `object_id` and
	/// need the same queue-during-reset replay the dispatcher's own reset
	/// path uses (spec §4.5 step 8).
	pub async fn replay_after_reset(&self, object_id: ObjectId) {
		self.drain_queued_during_reset(object_id).await;
	}

	/// Step 7's replay half: iterative, since a replayed message can itself
	/// trigger another reset (spec §4.3).
	async fn drain_queued_during_reset(&self, object_id: ObjectId) {
		loop {
			if self.shared.resetting.read().await.contains(&object_id) {
				return;
			}
			let next = {
				let mut queued = self.shared.queued_during_reset.write().await;
				queued.get_mut(&object_id).and_then(|q| q.pop_front())
			};
			let Some(msg) = next else { return };
			self.apply_one(object_id, msg).await;
		}
	}

	async fn current_user(&self) -> Option<String> {
		self.shared.current_user.read().await.clone()
	}
}


fn reset_open_options(
	v_in: Option<VersionId>,
	local_version: Option<VersionId>,
	current_user: Option<String>,
) -> OpenDocOptions {
	let mut opts = OpenDocOptions { current_user, ..Default::default() };
	match (v_in, local_version) {
		(Some(v), _) => opts = opts.with_expected_version(v),
		(None, Some(_)) => opts = opts.forced(),
		(None, None) => {}
	}
	opts
}

// vim: ts=4
