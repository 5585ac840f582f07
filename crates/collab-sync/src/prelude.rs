pub use collab_types::error::{ClResult, Error};
pub use collab_types::ids::{ObjectId, VersionId, ViewId, WorkspaceId};
pub use collab_types::types::Timestamp;

pub use tracing::{debug, error, info, warn};

// vim: ts=4
