//! Error types for the chat server
//!
//! Defines connection-level errors, registry errors and mailbox
//! delivery errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Connection-level errors
///
/// Covers both fatal errors (session teardown) and protocol errors
/// (reported to the client as an `ERR` line).
#[derive(Debug, Error)]
pub enum ChatError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error: over-long line, invalid UTF-8, or IO (fatal)
    #[error("line codec error: {0}")]
    Codec(#[from] LinesCodecError),

    /// First line was not a LOGIN command
    #[error("expected 'LOGIN <username>'")]
    ExpectedLogin,

    /// Handle is empty or contains whitespace
    #[error("invalid username")]
    InvalidUsername,

    /// Handle already registered by another session
    #[error("username taken: {0}")]
    UsernameTaken(String),

    /// Malformed DM command
    #[error("usage: DM <username> <text>")]
    DmUsage,

    /// DM target is not logged in
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Keyword not recognized
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Port value could not be parsed or is out of range
    #[error("invalid port: {0}")]
    InvalidPort(String),

    /// Idle timeout value could not be parsed
    #[error("invalid idle timeout: {0}")]
    InvalidTimeout(String),

    /// A flag that takes a value was given without one
    #[error("missing value for {0}")]
    MissingFlagValue(String),

    /// Command line flag not recognized
    #[error("unknown flag: {0}")]
    UnknownFlag(String),
}

/// Registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The handle is held by an active session
    #[error("handle already taken: {0}")]
    AlreadyTaken(String),
}

/// Mailbox delivery errors
///
/// Returned by the non-blocking enqueue. Broadcast and DM routing
/// drop the line on either variant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The mailbox is at capacity
    #[error("mailbox full")]
    MailboxFull,

    /// The writer loop has gone away
    #[error("mailbox closed")]
    MailboxClosed,
}
