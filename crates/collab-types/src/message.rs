//! Inbound message shapes (spec §3, §6). Polymorphic messages are modeled
//! as a tagged union over `{ update, sync_request }`, never a dynamically
//! typed bag of fields (spec §9 "Polymorphic messages").

use serde::{Deserialize, Serialize};

use crate::collab_kind::CollabKind;
use crate::ids::{ObjectId, VersionId};
use crate::types::Timestamp;

/// Identifies one outbound update for ordering/dedup purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageId {
	pub timestamp: i64,
	pub counter: u32,
}

/// `update` sub-message of a CRDT message.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdatePayload {
	pub version: Option<VersionId>,
	pub message_id: Option<MessageId>,
	/// Raw CRDT update bytes, opaque to the core.
	#[serde(default, with = "serde_bytes_opt")]
	pub data: Option<Vec<u8>>,
}

/// `sync_request` sub-message of a CRDT message.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SyncRequestPayload {
	pub version: Option<VersionId>,
}

mod serde_bytes_opt {
	use serde::{Deserialize, Deserializer, Serialize, Serializer};

	pub fn serialize<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
		v.serialize(s)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
		Option::<Vec<u8>>::deserialize(d)
	}
}

/// A single CRDT message arriving over either transport.
#[derive(Clone, Debug)]
pub struct CrdtMessage {
	pub object_id: ObjectId,
	pub collab_kind: CollabKind,
	pub update: Option<UpdatePayload>,
	pub sync_request: Option<SyncRequestPayload>,
}

impl CrdtMessage {
	/// The version carried by whichever sub-message is present (spec §4.3).
	pub fn incoming_version(&self) -> Option<VersionId> {
		self.update
			.as_ref()
			.and_then(|u| u.version)
			.or_else(|| self.sync_request.as_ref().and_then(|s| s.version))
	}

	pub fn published_at(&self) -> Option<Timestamp> {
		self.update
			.as_ref()
			.and_then(|u| u.message_id)
			.map(|id| Timestamp(id.timestamp))
	}
}

/// The nine workspace-notification sub-objects (spec §3/§6). Exactly one
/// variant fires per notification; there is no wildcard subscriber.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkspaceNotification {
	ProfileChange,
	PermissionChange,
	SectionChange,
	ShareViewsChange,
	MentionableListChange,
	ServerLimitChange,
	MemberProfileChange,
	FolderOutlineChange,
	FolderViewChange,
}

impl WorkspaceNotification {
	/// The internal bus topic name this notification maps to (spec §6).
	pub fn topic(&self) -> &'static str {
		match self {
			WorkspaceNotification::ProfileChange => "user-profile-changed",
			WorkspaceNotification::PermissionChange => "permission-changed",
			WorkspaceNotification::SectionChange => "section-changed",
			WorkspaceNotification::ShareViewsChange => "share-views-changed",
			WorkspaceNotification::MentionableListChange => "mentionable-person-list-changed",
			WorkspaceNotification::ServerLimitChange => "server-limit-changed",
			WorkspaceNotification::MemberProfileChange => "workspace-member-profile-changed",
			WorkspaceNotification::FolderOutlineChange => "folder-outline-changed",
			WorkspaceNotification::FolderViewChange => "folder-view-changed",
		}
	}
}

/// Either shape of inbound message (spec §3 IncomingMessage).
#[derive(Clone, Debug)]
pub enum IncomingMessage {
	Crdt(CrdtMessage),
	Notification(WorkspaceNotification),
}

impl IncomingMessage {
	pub fn object_id(&self) -> Option<ObjectId> {
		match self {
			IncomingMessage::Crdt(m) => Some(m.object_id),
			IncomingMessage::Notification(_) => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn incoming_version_prefers_update_over_sync_request() {
		let v1 = VersionId::generate();
		let v2 = VersionId::generate();
		let msg = CrdtMessage {
			object_id: ObjectId::generate(),
			collab_kind: CollabKind::Document,
			update: Some(UpdatePayload { version: Some(v1), ..Default::default() }),
			sync_request: Some(SyncRequestPayload { version: Some(v2) }),
		};
		assert_eq!(msg.incoming_version(), Some(v1));
	}

	#[test]
	fn incoming_version_falls_back_to_sync_request() {
		let v2 = VersionId::generate();
		let msg = CrdtMessage {
			object_id: ObjectId::generate(),
			collab_kind: CollabKind::Document,
			update: None,
			sync_request: Some(SyncRequestPayload { version: Some(v2) }),
		};
		assert_eq!(msg.incoming_version(), Some(v2));
	}

	#[test]
	fn notification_topic_names_match_spec() {
		assert_eq!(WorkspaceNotification::FolderViewChange.topic(), "folder-view-changed");
	}
}

// vim: ts=4
