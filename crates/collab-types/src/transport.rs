//! Transport boundary (spec §4.3, §6). Each transport exposes a single
//! "latest message" slot; a [`tokio::sync::watch`] channel *is* that slot —
//! it only ever holds the most recent value and notifies watchers of
//! changes, which is exactly the "watch the slot, re-enter on new enqueue"
//! behaviour spec §4.3 describes.

use std::sync::Arc;
use tokio::sync::watch;

use crate::collab_kind::CollabKind;
use crate::error::ClResult;
use crate::ids::ObjectId;
use crate::message::IncomingMessage;

/// An outbound CRDT message, forwarded unmodified to both transports via a
/// context's `emit` (spec §6).
#[derive(Clone, Debug)]
pub struct OutgoingUpdate {
	pub object_id: ObjectId,
	pub collab_kind: CollabKind,
	pub data: Vec<u8>,
}

/// Either of the two inbound transports (server-duplex, local-fan-out).
pub trait CollabTransport: Send + Sync + std::fmt::Debug {
	/// A receiver over the transport's latest-message slot. Every inbound
	/// message, CRDT or notification, flows through here.
	fn subscribe(&self) -> watch::Receiver<Option<Arc<IncomingMessage>>>;

	/// Forward an outbound CRDT update produced locally.
	fn emit(&self, update: OutgoingUpdate) -> ClResult<()>;
}

// vim: ts=4
