//! Local cache boundary (`openCollabDB`, spec §6).

use async_trait::async_trait;
use std::sync::Arc;

use crate::doc::{CrdtHandle, Snapshot};
use crate::error::ClResult;
use crate::ids::{ObjectId, VersionId};

#[derive(Clone, Debug, Default)]
pub struct OpenDocOptions {
	/// When set and different from the cached version, the implementation
	/// must evict the cached entry and return a freshly-initialised doc.
	pub expected_version: Option<VersionId>,
	pub current_user: Option<String>,
	/// Force a fresh doc even if the cache holds a matching entry, used
	/// when the server lost its version and local must re-sync from
	/// scratch (spec §4.3 reset table, "known -> unset").
	pub force_reset: bool,
}

impl OpenDocOptions {
	pub fn with_expected_version(mut self, version: VersionId) -> Self {
		self.expected_version = Some(version);
		self
	}

	pub fn forced(mut self) -> Self {
		self.force_reset = true;
		self
	}
}

#[async_trait]
pub trait CollabCache: Send + Sync {
	async fn open_collab_db(
		&self,
		object_id: ObjectId,
		opts: OpenDocOptions,
	) -> ClResult<Arc<dyn CrdtHandle>>;

	/// Fallback used when `open_collab_db` fails mid-reset: rebuild an
	/// in-memory-only document from the snapshot taken just before the
	/// previous instance was destroyed, so the triggering message can still
	/// be applied even though nothing was persisted (spec §4.3 step 4).
	async fn rehydrate_in_memory(
		&self,
		object_id: ObjectId,
		snapshot: Snapshot,
		version: Option<VersionId>,
	) -> ClResult<Arc<dyn CrdtHandle>>;
}

// vim: ts=4
