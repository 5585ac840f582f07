//! Batch Sync Utilities (spec §4.6): flush every live document, and push
//! the full state of every live document to the server in one HTTP call
//! ahead of a destructive server-side operation.

use std::sync::Arc;

use collab_types::http::{CollabHttpClient, FullSyncItem};
use collab_types::ids::WorkspaceId;

use crate::lifecycle::LifecycleManager;
use crate::prelude::*;

#[derive(Clone)]
pub struct BatchSync {
	lifecycle: Arc<LifecycleManager>,
	http: Arc<dyn CollabHttpClient>,
}

impl BatchSync {
	pub fn new(lifecycle: Arc<LifecycleManager>, http: Arc<dyn CollabHttpClient>) -> Self {
		Self { lifecycle, http }
	}

	/// Flush every registered context. Failures are logged per context and
	/// do not stop the others (spec §4.6, consistent with §7's "apply
	/// exception logged, processing continues" policy).
	pub async fn flush_all(&self) {
		for (object_id, ctx) in self.lifecycle.all_contexts().await {
			if let Err(e) = ctx.lock().await.flush().await {
				warn!("flush failed for {}: {}", object_id, e);
			}
		}
	}

	/// Flush, then push every live document's full state to the server in
	/// one batch. Transport failures are logged and swallowed so the caller
	/// (e.g. a workspace duplicate) can proceed regardless.
	pub async fn sync_all_to_server(&self, workspace_id: WorkspaceId) {
		self.flush_all().await;

		let mut items = Vec::new();
		for (object_id, ctx) in self.lifecycle.all_contexts().await {
			let ctx = ctx.lock().await;
			items.push(FullSyncItem {
				object_id,
				collab_kind: ctx.collab_kind(),
				state_vector: ctx.doc.state_vector(),
				doc_state: ctx.doc.encode_state_as_update(),
			});
		}

		if items.is_empty() {
			return;
		}

		if let Err(e) = self.http.collab_full_sync_batch(workspace_id, items).await {
			warn!("batch sync to server failed for workspace {}: {}", workspace_id, e);
		}
	}
}

// vim: ts=4
