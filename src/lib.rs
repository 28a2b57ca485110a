//! Line Chat Server Library
//!
//! A line-oriented TCP chat server: clients log in with a unique
//! handle, then exchange broadcast and private messages.
//!
//! # Features
//! - `LOGIN` handshake with handle uniqueness
//! - Broadcast (`MSG`) and private (`DM`) messages
//! - `WHO` listing and `PING`
//! - Disconnect notices to remaining users
//! - Idle timeout per session
//!
//! # Architecture
//! - `Registry` maps handles to sessions behind a read/write lock
//! - Each session has a bounded mailbox drained by its own writer task;
//!   fan-out never waits on a slow client
//! - Each connection task runs the login / command state machine
//! - An `IdleMonitor` closes connections that go quiet
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use line_chat::{ChatServer, ServerConfig, TracingAuditSink};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let listener = TcpListener::bind(config.bind_addr()).await.unwrap();
//!     ChatServer::new(config, Arc::new(TracingAuditSink))
//!         .run(listener)
//!         .await;
//! }
//! ```

pub mod audit;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod handler;
pub mod idle;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;
pub mod writer;

// Re-export main types for convenience
pub use audit::{AuditEvent, AuditSink, TracingAuditSink};
pub use broadcast::{Broadcaster, Delivery};
pub use config::ServerConfig;
pub use error::{ChatError, DeliveryError, RegistryError};
pub use handler::handle_connection;
pub use idle::IdleMonitor;
pub use message::{Command, ErrorCode, ServerLine};
pub use registry::Registry;
pub use server::{Acceptor, ChatContext, ChatServer};
pub use session::{Outbound, Session, MAILBOX_CAPACITY};
pub use types::{ConnectionId, Handle};
