//! Version Revert Controller (spec §4.5): the only component allowed to
//! mutate version state via the HTTP boundary.

use std::sync::Arc;

use collab_types::cache::{CollabCache, OpenDocOptions};
use collab_types::http::CollabHttpClient;
use collab_types::ids::{ObjectId, VersionId, ViewId, WorkspaceId};

use crate::dispatcher::Dispatcher;
use crate::lifecycle::LifecycleManager;
use crate::prelude::*;
use crate::rebuild::{rebuild, AwarenessFactory, RebuildRequest};
use crate::shared::SharedState;

#[derive(Clone)]
pub struct RevertController {
	shared: Arc<SharedState>,
	lifecycle: Arc<LifecycleManager>,
	http: Arc<dyn CollabHttpClient>,
	cache: Arc<dyn CollabCache>,
	event_bus: Arc<collab_types::event_bus::EventBus>,
	dispatcher: Dispatcher,
	awareness_factory: AwarenessFactory,
	grace_ms: u64,
}

impl RevertController {
	pub fn new(
		shared: Arc<SharedState>,
		lifecycle: Arc<LifecycleManager>,
		http: Arc<dyn CollabHttpClient>,
		cache: Arc<dyn CollabCache>,
		event_bus: Arc<collab_types::event_bus::EventBus>,
		dispatcher: Dispatcher,
		awareness_factory: AwarenessFactory,
		grace_ms: u64,
	) -> Self {
		Self { shared, lifecycle, http, cache, event_bus, dispatcher, awareness_factory, grace_ms }
	}

	/// `revert(viewId, targetVersion)`, spec §4.5.
	pub async fn revert(
		&self,
		workspace_id: WorkspaceId,
		view_id: ViewId,
		target_version: VersionId,
	) -> ClResult<()> {
		// Step 1.
		if self.shared.current_user.read().await.is_none() {
			return Err(Error::SyncContextUnavailable(format!(
				"no current user, cannot revert {view_id}"
			)));
		}
		let Some((object_id, old_ctx)) = self.lifecycle.find_by_view_id(view_id).await else {
			return Err(Error::SyncContextUnavailable(format!(
				"no sync context registered for view {view_id}"
			)));
		};

		let (old_doc, collab_kind) = {
			let ctx = old_ctx.lock().await;
			(ctx.doc.clone(), ctx.collab_kind())
		};

		// Step 2.
		old_ctx.lock().await.discard_pending_updates();
		self.lifecycle.unregister(object_id, false).await;

		// Step 3.
		self.shared.resetting.write().await.insert(object_id);

		// Step 4.
		let http_result = self
			.http
			.revert_collab_version(workspace_id, object_id, collab_kind, target_version)
			.await;

		let result = match http_result {
			Ok(r) => r,
			Err(e) => {
				self.recover_previous(object_id, view_id, collab_kind, old_doc).await;
				return Err(e);
			}
		};

		// Step 5.
		let effective_version = result.version.unwrap_or(target_version);

		// Step 6.
		let had_pending_cleanup = self.lifecycle.has_pending_cleanup(object_id).await;
		self.shared.skip_flush_on_destroy.write().await.insert(object_id);
		old_doc.destroy();

		// Step 7.
		let doc_state = result.doc_state;
		let cache = self.cache.clone();
		let open = Box::pin(async move {
			let opts = OpenDocOptions::default().with_expected_version(effective_version);
			let doc = cache.open_collab_db(object_id, opts).await?;
			doc.apply_update(&doc_state)?;
			Ok(doc)
		});

		let request = RebuildRequest {
			object_id,
			view_id,
			collab_kind,
			had_pending_cleanup,
			grace_ms: self.grace_ms,
			is_external_revert: false,
		};

		match rebuild(&self.lifecycle, &self.event_bus, &self.awareness_factory, open, request).await {
			Ok(_) => {
				self.shared.resetting.write().await.remove(&object_id);
				self.dispatcher.replay_after_reset(object_id).await;
				info!("reverted {} to {}", object_id, effective_version);
				Ok(())
			}
			Err(e) => {
				warn!("revert rebuild failed for {}, restoring previous context: {}", object_id, e);
				self.recover_previous(object_id, view_id, collab_kind, old_doc).await;
				Err(e)
			}
		}
	}

	/// Recovery path (spec §4.5 step 7, scenario 6): re-register the
	/// previous document so the UI keeps functioning, then drop the
	/// resetting marker and replay anything queued in the meantime.
	async fn recover_previous(
		&self,
		object_id: ObjectId,
		view_id: ViewId,
		collab_kind: collab_types::collab_kind::CollabKind,
		old_doc: Arc<dyn collab_types::doc::CrdtHandle>,
	) {
		let awareness = if collab_kind.supports_awareness() {
			Some((self.awareness_factory)())
		} else {
			None
		};
		if let Err(e) = self.lifecycle.register(old_doc, view_id, collab_kind, awareness).await {
			error!("failed to restore previous context for {} after failed revert: {}", object_id, e);
		}
		self.shared.resetting.write().await.remove(&object_id);
		self.dispatcher.replay_after_reset(object_id).await;
	}
}

// vim: ts=4
