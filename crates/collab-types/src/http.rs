//! HTTP boundary consumed by the core (spec §6). Deliberately narrow: only
//! the three calls the sync engine itself needs. Every other HTTP surface
//! (workspace/page/view CRUD, uploads, billing, templates, auth) is out of
//! scope per spec §1 and is not represented here.

use async_trait::async_trait;

use crate::collab_kind::CollabKind;
use crate::error::ClResult;
use crate::ids::{ObjectId, VersionId, WorkspaceId};
use crate::types::Timestamp;
use crate::version::VersionRecord;

/// Result of a successful version revert.
#[derive(Clone, Debug)]
pub struct RevertResult {
	pub state_vector: Vec<u8>,
	pub doc_state: Vec<u8>,
	/// The version the server actually restored to, if it differs from the
	/// requested target (spec §4.5 step 5).
	pub version: Option<VersionId>,
}

/// One document's full state, as sent in a batch sync (spec §4.6).
#[derive(Clone, Debug)]
pub struct FullSyncItem {
	pub object_id: ObjectId,
	pub collab_kind: CollabKind,
	pub state_vector: Vec<u8>,
	pub doc_state: Vec<u8>,
}

#[async_trait]
pub trait CollabHttpClient: Send + Sync {
	/// Restore a document to `target_version` server-side, returning the
	/// resulting state so the caller can rebuild its local document.
	async fn revert_collab_version(
		&self,
		workspace_id: WorkspaceId,
		object_id: ObjectId,
		collab_kind: CollabKind,
		target_version: VersionId,
	) -> ClResult<RevertResult>;

	/// Push the full state of a batch of documents before a destructive
	/// server-side operation (e.g. workspace duplicate).
	async fn collab_full_sync_batch(
		&self,
		workspace_id: WorkspaceId,
		items: Vec<FullSyncItem>,
	) -> ClResult<()>;

	/// Fetch version history for a document, optionally only entries
	/// created after `since`.
	async fn get_collab_versions(
		&self,
		workspace_id: WorkspaceId,
		object_id: ObjectId,
		since: Option<Timestamp>,
	) -> ClResult<Vec<VersionRecord>>;
}

// vim: ts=4
