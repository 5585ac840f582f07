//! Error handling subsystem. Implements a custom Error type.

use crate::prelude::*;

pub type ClResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	// Input validation
	ValidationError(String), // invalid input data (e.g. non-UUIDv4 object id)

	// Sync context lifecycle
	SyncContextUnavailable(String), // revert/flush requested for an unregistered view

	// Cache / local storage boundary (openCollabDB)
	CacheOpenFailed(String),

	// HTTP boundary (revert, batch sync, version listing)
	NetworkError(String),
	ServerError(String),

	// Internal invariant violations, kept distinct from validation errors
	Internal(String),
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::ValidationError(msg) => write!(f, "validation error: {msg}"),
			Error::SyncContextUnavailable(msg) => write!(f, "sync context unavailable: {msg}"),
			Error::CacheOpenFailed(msg) => write!(f, "cache open failed: {msg}"),
			Error::NetworkError(msg) => write!(f, "network error: {msg}"),
			Error::ServerError(msg) => write!(f, "server error: {msg}"),
			Error::Internal(msg) => write!(f, "internal error: {msg}"),
		}
	}
}

impl std::error::Error for Error {}

impl Error {
	pub fn validation(msg: impl Into<String>) -> Self {
		let msg = msg.into();
		warn!("validation error: {}", msg);
		Error::ValidationError(msg)
	}

	pub fn internal(msg: impl Into<String>) -> Self {
		let msg = msg.into();
		warn!("internal error: {}", msg);
		Error::Internal(msg)
	}
}

// vim: ts=4
