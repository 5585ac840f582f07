//! Identity newtypes. Every id in the sync core is a UUID v4; a non-v4 id
//! at a registration boundary is a programmer error (spec §7) and is
//! rejected with `Error::ValidationError` rather than silently accepted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClResult, Error};

fn require_v4(uuid: Uuid, what: &str) -> ClResult<Uuid> {
	if uuid.get_version_num() != 4 {
		return Err(Error::validation(format!("{what} must be a UUID v4, got {uuid}")));
	}
	Ok(uuid)
}

macro_rules! uuid_newtype {
	($name:ident, $label:expr) => {
		#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		pub struct $name(Uuid);

		impl $name {
			/// Construct from an existing UUID, validating it is v4.
			pub fn new(uuid: Uuid) -> ClResult<Self> {
				Ok(Self(require_v4(uuid, $label)?))
			}

			/// Generate a fresh random id.
			pub fn generate() -> Self {
				Self(Uuid::new_v4())
			}

			/// Parse from its string form, validating it is v4.
			pub fn parse(s: &str) -> ClResult<Self> {
				let uuid = Uuid::parse_str(s)
					.map_err(|e| Error::validation(format!("invalid {}: {e}", $label)))?;
				Self::new(uuid)
			}

			pub fn as_uuid(&self) -> Uuid {
				self.0
			}
		}

		impl std::fmt::Display for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				write!(f, "{}", self.0)
			}
		}
	};
}

uuid_newtype!(ObjectId, "object id");
uuid_newtype!(ViewId, "view id");
uuid_newtype!(VersionId, "version id");

/// Workspace identity. Unlike object/view/version ids this is not required
/// to be a v4 UUID by the spec, so it carries no format validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkspaceId(Uuid);

impl WorkspaceId {
	pub fn new(uuid: Uuid) -> Self {
		Self(uuid)
	}

	pub fn as_uuid(&self) -> Uuid {
		self.0
	}
}

impl std::fmt::Display for WorkspaceId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<ObjectId> for ViewId {
	/// Database views that share a backing database use a distinct view id;
	/// for every other collab kind the view id equals the object id, so a
	/// plain object id is always a valid default view id.
	fn from(object_id: ObjectId) -> Self {
		ViewId(object_id.as_uuid())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_v4() {
		let id = ObjectId::generate();
		assert!(ObjectId::new(id.as_uuid()).is_ok());
	}

	#[test]
	fn rejects_non_v4() {
		// Nil UUID is version 0, not v4.
		let err = ObjectId::new(Uuid::nil()).unwrap_err();
		assert!(matches!(err, Error::ValidationError(_)));
	}

	#[test]
	fn object_id_converts_to_view_id() {
		let obj = ObjectId::generate();
		let view: ViewId = obj.into();
		assert_eq!(view.as_uuid(), obj.as_uuid());
	}
}

// vim: ts=4
