//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `ConnectionId`: UUID-based identifier for an accepted stream
//! - `Handle`: validated, whitespace-free user name

use std::borrow::Borrow;

use uuid::Uuid;

use crate::error::ChatError;

/// Per-connection identifier
///
/// Minted when a stream is accepted, before any handle exists. It is the
/// `conn` field of `connect`, `login` and `error` audit events and of the
/// connection's log lines, which ties a rejected handshake or a failed
/// write back to the stream it happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Mint an id for a freshly accepted stream
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User handle
///
/// Non-empty and free of whitespace. Immutable once created; the
/// registry keys sessions by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle(String);

impl Handle {
    /// Validate a raw handle
    ///
    /// Surrounding whitespace is trimmed first; anything left that is
    /// empty or contains whitespace is rejected.
    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        let name = raw.trim();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(ChatError::InvalidUsername);
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Handle {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
