//! Audit events
//!
//! The dispatcher reports connection lifecycle and traffic through an
//! [`AuditSink`]. The default sink renders each event as JSON on the
//! `audit` tracing target.

use serde::Serialize;
use tracing::{info, warn};

/// Structured audit event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A stream was accepted
    Connect { conn: String, peer: String },
    /// A handle was registered
    Login { conn: String, handle: String },
    /// A broadcast chat message
    Message { from: String, text: String },
    /// A routed private message
    Dm { from: String, to: String, text: String },
    /// An authenticated session was torn down
    Disconnect { handle: String },
    /// Handshake rejection, name conflict or write failure
    Error { conn: String, detail: String },
}

impl AuditEvent {
    /// Short event name, matching the serialized tag
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::Connect { .. } => "connect",
            AuditEvent::Login { .. } => "login",
            AuditEvent::Message { .. } => "message",
            AuditEvent::Dm { .. } => "dm",
            AuditEvent::Disconnect { .. } => "disconnect",
            AuditEvent::Error { .. } => "error",
        }
    }
}

/// Receiver of audit events
///
/// Called inline from connection tasks; implementations must not block.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Audit sink that logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => info!(target: "audit", kind = event.kind(), "{}", json),
            Err(e) => warn!(target: "audit", kind = event.kind(), "failed to encode event: {}", e),
        }
    }
}
