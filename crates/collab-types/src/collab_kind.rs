//! The kinds of CRDT document the engine synchronizes. Closed set per the
//! GLOSSARY; only `Document` carries an awareness (presence/ephemeral)
//! channel.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollabKind {
	Document,
	Database,
	DatabaseRow,
	WorkspaceDatabase,
	AiChat,
	Folder,
}

impl CollabKind {
	/// Only Documents carry an awareness (presence/cursor) channel.
	pub fn supports_awareness(&self) -> bool {
		matches!(self, CollabKind::Document)
	}
}

// vim: ts=4
