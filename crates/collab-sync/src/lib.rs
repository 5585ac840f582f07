//! Collaborative document synchronization engine: per-document context
//! lifecycle, ordered message dispatch, the version-mismatch reset
//! protocol, user-initiated revert, multi-owner reference counting, batch
//! sync, and editor-history attribution.
//!
//! The data model and adapter boundaries (CRDT handle, transports, HTTP,
//! local cache) live in `collab-types`; this crate is the engine built on
//! top of them.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod batch;
pub mod dispatcher;
pub mod editor_history;
pub mod engine;
pub mod lifecycle;
pub mod notifications;
pub mod prelude;
pub mod rebuild;
pub mod revert;
pub mod shared;
pub mod version_cache;

pub use engine::CollabSyncEngine;

// vim: ts=4
