//! Workspace Notification Relay (spec §4.6/§6): forwards the nine
//! non-document server notifications to the app-level event bus. No
//! wildcard subscriber; each notification maps to exactly one topic
//! (spec §9 "Event bus").

use std::sync::Arc;

use collab_types::event_bus::EventBus;
use collab_types::message::WorkspaceNotification;

use crate::prelude::*;

#[derive(Clone)]
pub struct NotificationRelay {
	event_bus: Arc<EventBus>,
}

impl NotificationRelay {
	pub fn new(event_bus: Arc<EventBus>) -> Self {
		Self { event_bus }
	}

	pub fn relay(&self, notification: WorkspaceNotification) {
		debug!("relaying notification on topic {}", notification.topic());
		self.event_bus.emit_notification(notification);
	}
}

// vim: ts=4
