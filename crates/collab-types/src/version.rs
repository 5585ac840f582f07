//! `VersionRecord` (spec §3) and the one predicate the version-cache
//! helper needs to decide whether a remote record supersedes a cached one.

use std::collections::BTreeSet;

use crate::ids::VersionId;
use crate::types::Timestamp;

#[derive(Clone, Debug)]
pub struct VersionRecord {
	pub version_id: VersionId,
	pub parent_id: Option<VersionId>,
	pub label: Option<String>,
	pub created_at: Timestamp,
	pub editor_user_ids: Option<BTreeSet<String>>,
	/// Opaque snapshot bytes; `None` means the version was deleted
	/// server-side (spec §4.8 "null snapshot indicates deletion").
	pub snapshot: Option<Vec<u8>>,
}

impl VersionRecord {
	/// A remote record supersedes a cached one iff it is strictly newer, or
	/// its snapshot is `None` (a server-side tombstone always wins so the
	/// deletion is observed locally).
	pub fn supersedes(&self, cached: &VersionRecord) -> bool {
		self.snapshot.is_none() || self.created_at > cached.created_at
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(created_at: i64, has_snapshot: bool) -> VersionRecord {
		VersionRecord {
			version_id: VersionId::generate(),
			parent_id: None,
			label: None,
			created_at: Timestamp(created_at),
			editor_user_ids: None,
			snapshot: has_snapshot.then(|| vec![1, 2, 3]),
		}
	}

	#[test]
	fn newer_timestamp_supersedes() {
		let cached = record(100, true);
		let remote = record(200, true);
		assert!(remote.supersedes(&cached));
		assert!(!cached.supersedes(&remote));
	}

	#[test]
	fn null_snapshot_always_supersedes() {
		let cached = record(500, true);
		let tombstone = record(10, false);
		assert!(tombstone.supersedes(&cached));
	}
}

// vim: ts=4
