//! Version-cache helper (spec §4.8): merges a server-fetched version list
//! into the locally-cached one, evicting anything past the retention
//! window, and back-filling editor user-ids via the editor-history helper
//! when the server didn't already supply them.

use std::collections::BTreeMap;
use std::sync::Arc;

use collab_types::doc::Snapshot;
use collab_types::ids::VersionId;
use collab_types::sync_context::UserMapping;
use collab_types::types::Timestamp;
use collab_types::version::VersionRecord;

use crate::editor_history::editors_between;
use crate::prelude::*;

const RETENTION_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Decodes a version's opaque snapshot bytes into the structural form the
/// editor-history helper needs. The decode itself is a CRDT-library concern
/// (spec §1 Non-goals), so it is injected rather than implemented here.
pub type SnapshotDecoder = Arc<dyn Fn(&[u8]) -> ClResult<Snapshot> + Send + Sync>;

#[derive(Default)]
pub struct VersionCache {
	entries: BTreeMap<VersionId, VersionRecord>,
}

impl VersionCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// The `since` parameter the caller should pass to `getCollabVersions`
	/// on the next fetch: the newest `created_at` already cached.
	pub fn last_cached_created_at(&self) -> Option<Timestamp> {
		self.entries.values().map(|r| r.created_at).max()
	}

	pub fn get(&self, version_id: VersionId) -> Option<&VersionRecord> {
		self.entries.get(&version_id)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Merge `remote` into the cache, then evict anything older than the
	/// 7-day retention window relative to `now`.
	pub fn merge(
		&mut self,
		remote: Vec<VersionRecord>,
		now: Timestamp,
		decoder: Option<&SnapshotDecoder>,
		mapping: &UserMapping,
	) {
		for mut record in remote {
			let supersedes = match self.entries.get(&record.version_id) {
				Some(cached) => record.supersedes(cached),
				None => true,
			};
			if !supersedes {
				continue;
			}

			if record.editor_user_ids.is_none() {
				if let Some(computed) = self.compute_editors(&record, decoder, mapping) {
					record.editor_user_ids = Some(computed);
				}
			}

			self.entries.insert(record.version_id, record);
		}

		self.evict_before(now);
	}

	fn compute_editors(
		&self,
		record: &VersionRecord,
		decoder: Option<&SnapshotDecoder>,
		mapping: &UserMapping,
	) -> Option<std::collections::BTreeSet<String>> {
		let decoder = decoder?;
		let snapshot_bytes = record.snapshot.as_ref()?;
		let to_snapshot = match decoder(snapshot_bytes) {
			Ok(s) => s,
			Err(e) => {
				warn!("failed to decode snapshot for version {}: {}", record.version_id, e);
				return None;
			}
		};
		let from_snapshot = record
			.parent_id
			.and_then(|parent_id| self.entries.get(&parent_id))
			.and_then(|parent| parent.snapshot.as_ref())
			.and_then(|bytes| decoder(bytes).ok());

		Some(editors_between(from_snapshot.as_ref(), &to_snapshot, mapping))
	}

	fn evict_before(&mut self, now: Timestamp) {
		let cutoff = now.add_seconds(-RETENTION_SECONDS);
		self.entries.retain(|_, record| record.created_at >= cutoff);
	}
}


// vim: ts=4
