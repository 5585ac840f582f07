//! Abstract CRDT capabilities consumed by the sync core.
//!
//! The engine never re-implements CRDT merge semantics (spec §1 Non-goals);
//! it only needs the update/snapshot/awareness primitives a real CRDT
//! library (e.g. `yrs`, the Rust port of Yjs the teacher crate depends on)
//! exposes. [`CrdtHandle`] is that boundary, kept object-safe so the
//! registry can hold `Arc<dyn CrdtHandle>` regardless of backend.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::collab_kind::CollabKind;
use crate::error::ClResult;
use crate::ids::{ObjectId, VersionId, ViewId};

/// A CRDT client id, as assigned by the underlying library (Yjs/yrs call
/// this `clientID`).
pub type ClientId = u64;

/// A half-open clock range `[clock, clock + len)`, as used by Yjs-style
/// delete sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interval {
	pub clock: u32,
	pub len: u32,
}

impl Interval {
	pub fn new(clock: u32, len: u32) -> Self {
		Self { clock, len }
	}

	pub fn end(&self) -> u32 {
		self.clock + self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}
}

/// A point-in-time snapshot of a CRDT document: one insertion clock and one
/// delete set per client. Sufficient to compute the editor set between two
/// points in a document's history (spec §4.7).
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
	/// Per-client insertion clock (how many ops each client has produced).
	pub state_vector: BTreeMap<ClientId, u32>,
	/// Per-client delete set, as disjoint ascending intervals.
	pub delete_set: BTreeMap<ClientId, Vec<Interval>>,
}

impl Snapshot {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn clock_for(&self, client: ClientId) -> u32 {
		self.state_vector.get(&client).copied().unwrap_or(0)
	}

	pub fn deletes_for(&self, client: ClientId) -> &[Interval] {
		self.delete_set.get(&client).map(Vec::as_slice).unwrap_or(&[])
	}
}

/// Companion metadata attached to a document at registration time (spec §3,
/// §9 "dynamic object fields" note). Stored alongside the document, never
/// as ad hoc properties on it.
#[derive(Clone, Debug)]
pub struct DocMeta {
	pub object_id: ObjectId,
	pub view_id: ViewId,
	pub collab_kind: CollabKind,
	pub sync_bound: bool,
}

impl DocMeta {
	pub fn new(object_id: ObjectId, view_id: ViewId, collab_kind: CollabKind) -> Self {
		Self { object_id, view_id, collab_kind, sync_bound: false }
	}
}

/// Presence/ephemeral-state channel, attached only to `Document` collabs.
pub trait AwarenessChannel: Send + Sync + std::fmt::Debug {}

pub type Awareness = Arc<dyn AwarenessChannel>;

/// A callback invoked when the underlying CRDT library destroys a document
/// out from under the engine (spec §4.2 "external signal").
pub type DestroyListener = Box<dyn Fn() + Send + Sync>;

/// A callback invoked when the sync core is about to replace a document
/// during a reset, so UI listeners bound to the old handle can detach
/// before it is torn down (spec §4.3 step 3).
pub type ResetListener = Box<dyn Fn() + Send + Sync>;

/// A callback invoked whenever a local transaction produces an update that
/// needs forwarding to the transports (spec §4.2 "Emits via two
/// transports").
pub type LocalUpdateListener = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Abstract CRDT document capabilities. Implemented by a real adapter (a
/// `yrs::Doc` wrapper, in a deployed build) and, in this workspace, by an
/// in-memory test double.
#[async_trait]
pub trait CrdtHandle: Send + Sync + std::fmt::Debug {
	/// Stable identity; must equal the object id it was opened for.
	fn guid(&self) -> ObjectId;

	/// The document's currently-adopted version, or `None` if unset.
	fn version(&self) -> Option<VersionId>;

	/// Adopt a (possibly absent) version, e.g. after a successful reset.
	fn set_version(&self, version: Option<VersionId>);

	/// Compact summary of what this peer knows (CRDT state vector).
	fn state_vector(&self) -> Vec<u8>;

	/// Full encoded state (CRDT doc state).
	fn encode_state_as_update(&self) -> Vec<u8>;

	/// Apply a remote update. Implementations must be commutative/
	/// idempotent per CRDT semantics; the core treats this as opaque.
	fn apply_update(&self, update: &[u8]) -> ClResult<()>;

	/// Point-in-time snapshot for editor-history computation.
	fn snapshot(&self) -> Snapshot;

	/// Drop any locally-pending, not-yet-flushed updates without sending
	/// them. Used when a document is about to be torn down during a reset
	/// so stale edits are never emitted (spec §4.2).
	fn discard_pending_updates(&self);

	/// Push any locally-pending updates to the transports.
	async fn flush(&self) -> ClResult<()>;

	/// Tear the document down. Idempotent.
	fn destroy(&self);

	/// Signal that this document is about to be replaced by a reset, ahead
	/// of `destroy`, so bound UI listeners can detach cleanly.
	fn emit_reset(&self);

	/// Register the (single) destroy listener. Replaces any previous one —
	/// mirrors a CRDT library's single `on('destroy', cb)` slot.
	fn on_destroy(&self, listener: DestroyListener);

	/// Register the (single) reset listener. Replaces any previous one.
	fn on_reset(&self, listener: ResetListener);

	/// Register the (single) local-update listener. Replaces any previous
	/// one.
	fn on_local_update(&self, listener: LocalUpdateListener);

	/// The CRDT client id used for local transactions, once the first
	/// local transaction has happened. `None` before any local edit.
	fn local_client_id(&self) -> Option<ClientId>;
}

// vim: ts=4
