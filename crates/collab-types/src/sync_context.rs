//! `SyncContext` — the runtime binding between a [`CrdtHandle`] and the
//! transports (spec §3).

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};

use crate::collab_kind::CollabKind;
use crate::doc::{Awareness, ClientId, CrdtHandle, DocMeta};
use crate::error::ClResult;

/// `clientID -> user-id` association, attached lazily on the first local
/// transaction so editor-history attribution (spec §4.7) can resolve the
/// current user's edits without needing the mapping up front.
#[derive(Clone, Debug, Default)]
pub struct UserMapping {
	entries: Arc<Mutex<std::collections::BTreeMap<ClientId, String>>>,
}

impl UserMapping {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record(&self, client_id: ClientId, user_id: impl Into<String>) {
		if let Ok(mut entries) = self.entries.lock() {
			entries.insert(client_id, user_id.into());
		}
	}

	pub fn resolve(&self, client_id: ClientId) -> Option<String> {
		self.entries.lock().ok()?.get(&client_id).cloned()
	}
}

/// Flushes pending local updates for a context out to both transports.
pub type FlushFn = Arc<dyn Fn() -> BoxFuture<'static, ClResult<()>> + Send + Sync>;

/// Drops pending local updates without sending them.
pub type DiscardFn = Arc<dyn Fn() + Send + Sync>;

pub struct SyncContext {
	pub doc: Arc<dyn CrdtHandle>,
	pub meta: DocMeta,
	pub awareness: Option<Awareness>,
	pub user_mapping: Option<UserMapping>,
	flush: FlushFn,
	discard: DiscardFn,
}

impl std::fmt::Debug for SyncContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SyncContext")
			.field("object_id", &self.meta.object_id)
			.field("collab_kind", &self.meta.collab_kind)
			.field("sync_bound", &self.meta.sync_bound)
			.finish()
	}
}

impl SyncContext {
	pub fn new(
		doc: Arc<dyn CrdtHandle>,
		meta: DocMeta,
		awareness: Option<Awareness>,
		flush: FlushFn,
		discard: DiscardFn,
	) -> Self {
		debug_assert!(
			awareness.is_none() || meta.collab_kind.supports_awareness(),
			"awareness is only valid for Document collabs",
		);
		Self { doc, meta, awareness, user_mapping: None, flush, discard }
	}

	pub fn object_id(&self) -> crate::ids::ObjectId {
		self.meta.object_id
	}

	pub fn collab_kind(&self) -> CollabKind {
		self.meta.collab_kind
	}

	pub async fn flush(&self) -> ClResult<()> {
		(self.flush)().await
	}

	pub fn discard_pending_updates(&self) {
		(self.discard)();
	}

	/// Attach a user mapping if this is the first local transaction for a
	/// Document context with a known current user (spec §4.2).
	pub fn ensure_user_mapping(&mut self) -> &UserMapping {
		self.user_mapping.get_or_insert_with(UserMapping::new)
	}
}

// vim: ts=4
