//! Outbound event bus (spec §6, §9 "Event bus"): a tiny typed
//! publish-subscribe with the nine workspace-notification topics, plus
//! `doc-replaced` and the `last-updated-collab` observation. Each topic has
//! its own channel — there is no wildcard subscriber, grounded on
//! `cloudillo_core::ws_broadcast::BroadcastManager`'s per-recipient
//! broadcast channel shape.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::collab_kind::CollabKind;
use crate::doc::{Awareness, CrdtHandle};
use crate::ids::{ObjectId, ViewId};
use crate::message::WorkspaceNotification;
use crate::types::Timestamp;

/// `doc-replaced { objectId, viewId, doc, awareness?, isExternalRevert? }`.
#[derive(Clone, Debug)]
pub struct DocReplacedEvent {
	pub object_id: ObjectId,
	pub view_id: ViewId,
	pub doc: Arc<dyn CrdtHandle>,
	pub awareness: Option<Awareness>,
	pub is_external_revert: bool,
}

/// `last-updated-collab { objectId, collabType, publishedAt? }`.
#[derive(Clone, Debug)]
pub struct LastUpdatedEvent {
	pub object_id: ObjectId,
	pub collab_kind: CollabKind,
	pub published_at: Option<Timestamp>,
}

const CHANNEL_CAPACITY: usize = 256;

pub struct EventBus {
	doc_replaced: broadcast::Sender<DocReplacedEvent>,
	last_updated: broadcast::Sender<LastUpdatedEvent>,
	notifications: broadcast::Sender<WorkspaceNotification>,
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new()
	}
}

impl EventBus {
	pub fn new() -> Self {
		Self {
			doc_replaced: broadcast::channel(CHANNEL_CAPACITY).0,
			last_updated: broadcast::channel(CHANNEL_CAPACITY).0,
			notifications: broadcast::channel(CHANNEL_CAPACITY).0,
		}
	}

	pub fn emit_doc_replaced(&self, event: DocReplacedEvent) {
		// No subscribers is a normal, silent case (e.g. headless engine in tests).
		let _ = self.doc_replaced.send(event);
	}

	pub fn subscribe_doc_replaced(&self) -> broadcast::Receiver<DocReplacedEvent> {
		self.doc_replaced.subscribe()
	}

	pub fn emit_last_updated(&self, event: LastUpdatedEvent) {
		let _ = self.last_updated.send(event);
	}

	pub fn subscribe_last_updated(&self) -> broadcast::Receiver<LastUpdatedEvent> {
		self.last_updated.subscribe()
	}

	pub fn emit_notification(&self, notification: WorkspaceNotification) {
		let _ = self.notifications.send(notification);
	}

	pub fn subscribe_notifications(&self) -> broadcast::Receiver<WorkspaceNotification> {
		self.notifications.subscribe()
	}
}

// vim: ts=4
