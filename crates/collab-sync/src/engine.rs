//! Top-level orchestrator (spec §3/§6): the one object an embedding app
//! constructs, wiring the shared state, the lifecycle manager, the
//! dispatcher, the revert controller, batch sync, and the notification
//! relay behind a single public API.
//!
//! Grounded on `cloudillo_core::app::App::new`, which performs the same
//! "construct every subsystem once, hand back one facade" wiring for the
//! server's own components.

use std::sync::Arc;

use collab_types::cache::CollabCache;
use collab_types::collab_kind::CollabKind;
use collab_types::doc::{Awareness, CrdtHandle};
use collab_types::event_bus::{DocReplacedEvent, EventBus, LastUpdatedEvent};
use collab_types::http::CollabHttpClient;
use collab_types::ids::{ObjectId, VersionId, ViewId, WorkspaceId};
use collab_types::message::WorkspaceNotification;
use collab_types::sync_context::UserMapping;
use collab_types::transport::CollabTransport;
use collab_types::types::Timestamp;
use collab_types::version::VersionRecord;
use tokio::sync::broadcast;

use crate::batch::BatchSync;
use crate::dispatcher::Dispatcher;
use crate::lifecycle::LifecycleManager;
use crate::notifications::NotificationRelay;
use crate::prelude::*;
use crate::rebuild::AwarenessFactory;
use crate::revert::RevertController;
use crate::shared::{SharedState, SharedSyncContext};
use crate::version_cache::{SnapshotDecoder, VersionCache};

pub struct CollabSyncEngine {
	shared: Arc<SharedState>,
	lifecycle: Arc<LifecycleManager>,
	dispatcher: Dispatcher,
	revert: RevertController,
	batch: BatchSync,
	http: Arc<dyn CollabHttpClient>,
	event_bus: Arc<EventBus>,
	grace_ms: u64,
}

impl CollabSyncEngine {
	/// Construct every subsystem and start watching `transports` for the
	/// engine's lifetime (spec §4.3 "the dispatcher drains both
	/// transports").
	pub fn new(
		transports: Vec<Arc<dyn CollabTransport>>,
		http: Arc<dyn CollabHttpClient>,
		cache: Arc<dyn CollabCache>,
		awareness_factory: AwarenessFactory,
		grace_ms: u64,
	) -> Self {
		let shared = Arc::new(SharedState::new());
		let lifecycle = Arc::new(LifecycleManager::new(shared.clone(), transports.clone()));
		let event_bus = Arc::new(EventBus::new());
		let notifications = NotificationRelay::new(event_bus.clone());

		let dispatcher = Dispatcher::new(
			shared.clone(),
			lifecycle.clone(),
			cache.clone(),
			event_bus.clone(),
			notifications,
			awareness_factory.clone(),
			grace_ms,
		);

		let revert = RevertController::new(
			shared.clone(),
			lifecycle.clone(),
			http.clone(),
			cache,
			event_bus.clone(),
			dispatcher.clone(),
			awareness_factory,
			grace_ms,
		);

		let batch = BatchSync::new(lifecycle.clone(), http.clone());

		for transport in &transports {
			dispatcher.watch_transport(transport.clone());
		}

		Self { shared, lifecycle, dispatcher, revert, batch, http, event_bus, grace_ms }
	}

	/// The grace period new callers get if they don't override it; exposed
	/// so tests and embedders can construct a [`VersionCache`] decoder-free
	/// merge with the same default (spec §4.2).
	pub fn default_grace_ms(&self) -> u64 {
		self.grace_ms
	}

	// -- Registration / lifecycle (spec §4.2) --------------------------

	pub async fn register(
		&self,
		doc: Arc<dyn CrdtHandle>,
		view_id: ViewId,
		collab_kind: CollabKind,
		awareness: Option<Awareness>,
	) -> ClResult<SharedSyncContext> {
		self.lifecycle.register(doc, view_id, collab_kind, awareness).await
	}

	/// A caller releasing one owning reference. Decrements the owner count
	/// and, if it reaches zero, starts the grace-period teardown timer
	/// (spec §4.2).
	pub async fn release(&self, object_id: ObjectId) {
		self.lifecycle.clone().schedule_deferred_cleanup(object_id, self.grace_ms).await;
	}

	pub async fn attach_user_mapping_on_first_transaction(
		&self,
		object_id: ObjectId,
		current_user: &str,
	) {
		self.lifecycle.attach_user_mapping_on_first_transaction(object_id, current_user).await;
	}

	pub async fn owner_count(&self, object_id: ObjectId) -> u32 {
		self.lifecycle.owner_count(object_id).await
	}

	pub async fn is_registered(&self, object_id: ObjectId) -> bool {
		self.lifecycle.is_registered(object_id).await
	}

	pub async fn get(&self, object_id: ObjectId) -> Option<SharedSyncContext> {
		self.lifecycle.get(object_id).await
	}

	/// Record the authenticated user for this engine instance. Read by the
	/// reset protocol (spec §4.3 step 4) and by revert (spec §4.5 step 1).
	pub async fn set_current_user(&self, user: Option<String>) {
		*self.shared.current_user.write().await = user;
	}

	// -- Version revert (spec §4.5) -------------------------------------

	pub async fn revert(
		&self,
		workspace_id: WorkspaceId,
		view_id: ViewId,
		target_version: VersionId,
	) -> ClResult<()> {
		self.revert.revert(workspace_id, view_id, target_version).await
	}

	// -- Batch sync (spec §4.6) -----------------------------------------

	pub async fn flush_all(&self) {
		self.batch.flush_all().await;
	}

	pub async fn sync_all_to_server(&self, workspace_id: WorkspaceId) {
		self.batch.sync_all_to_server(workspace_id).await;
	}

	// -- Version history cache (spec §4.8) ------------------------------

	/// Fetch version history newer than what `cache` already holds and
	/// merge it in, computing editor user-ids for any persisted entry the
	/// server didn't already annotate.
	pub async fn refresh_version_cache(
		&self,
		workspace_id: WorkspaceId,
		object_id: ObjectId,
		cache: &mut VersionCache,
		decoder: Option<&SnapshotDecoder>,
		mapping: &UserMapping,
	) -> ClResult<()> {
		let since = cache.last_cached_created_at();
		let remote: Vec<VersionRecord> =
			self.http.get_collab_versions(workspace_id, object_id, since).await?;
		cache.merge(remote, Timestamp::now(), decoder, mapping);
		Ok(())
	}

	// -- Event subscriptions (spec §6, §9 "Event bus") ------------------

	pub fn subscribe_doc_replaced(&self) -> broadcast::Receiver<DocReplacedEvent> {
		self.event_bus.subscribe_doc_replaced()
	}

	pub fn subscribe_last_updated(&self) -> broadcast::Receiver<LastUpdatedEvent> {
		self.event_bus.subscribe_last_updated()
	}

	pub fn subscribe_notifications(&self) -> broadcast::Receiver<WorkspaceNotification> {
		self.event_bus.subscribe_notifications()
	}

	// -- Shutdown --------------------------------------------------------

	/// Dispose the engine: stop all inbound processing, drop queued work,
	/// and cancel every running grace timer (spec §5 Cancellation).
	pub async fn dispose(&self) {
		self.shared.dispose().await;
	}
}

// vim: ts=4
