//! Shared types, adapter traits, and error types for the collaborative
//! document sync core.
//!
//! This crate contains the foundational boundary this workspace is built
//! around: the data model (spec §3), the trait boundaries to the CRDT
//! library, transports, HTTP, and local cache (spec §6), and the event
//! bus. The actual engine logic lives in `collab-sync`.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod collab_kind;
pub mod doc;
pub mod error;
pub mod event_bus;
pub mod http;
pub mod ids;
pub mod message;
pub mod prelude;
pub mod sync_context;
pub mod types;
pub mod version;

// vim: ts=4
