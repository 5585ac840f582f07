//! Doc Rebuild Primitive (spec §4.4): the shared teardown+rebuild sequence
//! used by both the server-initiated reset (§4.3) and the user-initiated
//! revert (§4.5), so both paths are behaviourally identical to a consumer.
//!
//! Grounded on AppFlowy's `FlowyDocumentManager::open_document`, which also
//! funnels "replace the live handle for this id" through one function
//! regardless of why the replacement happened.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use collab_types::collab_kind::CollabKind;
use collab_types::doc::{Awareness, CrdtHandle};
use collab_types::event_bus::{DocReplacedEvent, EventBus};
use collab_types::ids::{ObjectId, ViewId};

use crate::lifecycle::LifecycleManager;
use crate::prelude::*;

/// A one-shot async operation that opens the replacement document. Boxed so
/// both the reset and revert call sites can supply their own cache-open
/// closure without the primitive depending on `CollabCache` directly.
pub type OpenDocFuture = Pin<Box<dyn Future<Output = ClResult<Arc<dyn CrdtHandle>>> + Send>>;

/// Produces a fresh awareness channel for Document collabs. Taken as a
/// factory rather than a concrete type because awareness construction is an
/// adapter concern (spec §1 Non-goals).
pub type AwarenessFactory = Arc<dyn Fn() -> Awareness + Send + Sync>;

pub struct RebuildRequest {
	pub object_id: ObjectId,
	pub view_id: ViewId,
	pub collab_kind: CollabKind,
	/// Captured by the caller, before tearing the old document down, via
	/// [`LifecycleManager::has_pending_cleanup`].
	pub had_pending_cleanup: bool,
	pub grace_ms: u64,
	pub is_external_revert: bool,
}

pub struct RebuildOutcome {
	pub doc: Arc<dyn CrdtHandle>,
	pub awareness: Option<Awareness>,
}

/// Run the rebuild sequence: open, allocate awareness, register, carry
/// forward any pending cleanup, emit `doc-replaced`.
pub async fn rebuild(
	lifecycle: &Arc<LifecycleManager>,
	event_bus: &EventBus,
	awareness_factory: &AwarenessFactory,
	open: OpenDocFuture,
	request: RebuildRequest,
) -> ClResult<RebuildOutcome> {
	let doc = open.await?;

	let awareness = if request.collab_kind.supports_awareness() {
		Some(awareness_factory())
	} else {
		None
	};

	let ctx = lifecycle
		.register(doc.clone(), request.view_id, request.collab_kind, awareness.clone())
		.await?;
	let _ = ctx;

	lifecycle
		.clone()
		.carry_forward_cleanup(request.had_pending_cleanup, request.object_id, request.grace_ms)
		.await;

	event_bus.emit_doc_replaced(DocReplacedEvent {
		object_id: request.object_id,
		view_id: request.view_id,
		doc: doc.clone(),
		awareness: awareness.clone(),
		is_external_revert: request.is_external_revert,
	});

	info!(
		"rebuilt {} (external_revert={})",
		request.object_id, request.is_external_revert
	);
	Ok(RebuildOutcome { doc, awareness })
}

// vim: ts=4
