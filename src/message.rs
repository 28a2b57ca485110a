//! Line protocol definitions
//!
//! Newline-delimited UTF-8 text, one command per line. Keywords are
//! case-insensitive and separated from their argument by the first run
//! of whitespace.

use std::fmt;

use crate::error::ChatError;
use crate::types::Handle;

/// Normalize a raw inbound line
///
/// Strips every carriage return and trims surrounding whitespace.
/// Returns an empty string for blank lines.
pub fn clean_line(raw: &str) -> String {
    raw.replace('\r', "").trim().to_string()
}

/// Split a cleaned line into keyword and argument
///
/// The argument is trimmed at its edges only; interior whitespace is
/// preserved.
pub fn split_command(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    }
}

/// Parse the handshake line
///
/// The keyword must be `LOGIN` (any case); the argument must be a valid
/// handle.
pub fn parse_login(line: &str) -> Result<Handle, ChatError> {
    let (keyword, rest) = split_command(line);
    if !keyword.eq_ignore_ascii_case("LOGIN") {
        return Err(ChatError::ExpectedLogin);
    }
    Handle::parse(rest)
}

/// Client → Server command, after login
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Broadcast to everyone else. Empty text is ignored.
    Msg { text: String },
    /// List logged-in handles
    Who,
    /// Liveness check
    Ping,
    /// Private message to one handle
    Dm { target: String, text: String },
}

impl Command {
    /// Parse a cleaned, non-blank line
    pub fn parse(line: &str) -> Result<Self, ChatError> {
        let (keyword, rest) = split_command(line);
        match keyword.to_ascii_uppercase().as_str() {
            "MSG" => Ok(Command::Msg {
                text: rest.to_string(),
            }),
            "WHO" => Ok(Command::Who),
            "PING" => Ok(Command::Ping),
            "DM" => parse_dm(rest),
            _ => Err(ChatError::UnknownCommand(keyword.to_string())),
        }
    }
}

fn parse_dm(rest: &str) -> Result<Command, ChatError> {
    let Some((target, text)) = rest.split_once(char::is_whitespace) else {
        return Err(ChatError::DmUsage);
    };
    let (target, text) = (target.trim(), text.trim());
    if target.is_empty() || text.is_empty() {
        return Err(ChatError::DmUsage);
    }
    Ok(Command::Dm {
        target: target.to_string(),
        text: text.to_string(),
    })
}

/// Server → Client line
///
/// `Display` renders the exact wire text, without the trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// Login accepted
    Ok,
    /// Protocol error
    Error(ErrorCode),
    /// Broadcast chat message
    Msg { from: String, text: String },
    /// Private message
    Dm { from: String, text: String },
    /// Sender-side DM confirmation (only with DM echo enabled)
    DmSent { to: String, text: String },
    /// One logged-in handle, in reply to WHO
    User(String),
    /// Reply to PING
    Pong,
    /// Another user left
    Disconnected(String),
    /// Idle timeout notice, sent right before the stream is closed
    Inactive,
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerLine::Ok => f.write_str("OK"),
            ServerLine::Error(code) => write!(f, "ERR {}", code),
            ServerLine::Msg { from, text } => write!(f, "MSG {} {}", from, text),
            ServerLine::Dm { from, text } => write!(f, "DM {} {}", from, text),
            ServerLine::DmSent { to, text } => write!(f, "SENT {} {}", to, text),
            ServerLine::User(handle) => write!(f, "USER {}", handle),
            ServerLine::Pong => f.write_str("PONG"),
            ServerLine::Disconnected(handle) => write!(f, "INFO {} disconnected", handle),
            ServerLine::Inactive => f.write_str("INFO disconnected due to inactivity"),
        }
    }
}

/// Error codes for `ServerLine::Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// First line was not LOGIN
    ExpectedLogin,
    /// Empty handle or handle with whitespace
    InvalidUsername,
    /// Handle already registered
    UsernameTaken,
    /// Malformed DM
    DmUsage,
    /// DM target not logged in
    UserNotFound,
    /// Unrecognized keyword
    UnknownCommand,
    /// Anything that is not a protocol error
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorCode::ExpectedLogin => "expected 'LOGIN <username>'",
            ErrorCode::InvalidUsername => "invalid-username",
            ErrorCode::UsernameTaken => "username-taken",
            ErrorCode::DmUsage => "usage: DM <username> <text>",
            ErrorCode::UserNotFound => "user-not-found",
            ErrorCode::UnknownCommand => "unknown-cmd",
            ErrorCode::Internal => "internal",
        };
        f.write_str(text)
    }
}

/// Convert ChatError to ServerLine for client notification
impl From<ChatError> for ServerLine {
    fn from(err: ChatError) -> Self {
        let code = match err {
            ChatError::ExpectedLogin => ErrorCode::ExpectedLogin,
            ChatError::InvalidUsername => ErrorCode::InvalidUsername,
            ChatError::UsernameTaken(_) => ErrorCode::UsernameTaken,
            ChatError::DmUsage => ErrorCode::DmUsage,
            ChatError::UserNotFound(_) => ErrorCode::UserNotFound,
            ChatError::UnknownCommand(_) => ErrorCode::UnknownCommand,
            // Fatal errors are not typically converted (connection closes)
            _ => ErrorCode::Internal,
        };
        ServerLine::Error(code)
    }
}
