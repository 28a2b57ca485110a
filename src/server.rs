//! ChatServer accept loop
//!
//! Owns the process-wide registry and hands every accepted stream to
//! its own connection task.

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::audit::AuditSink;
use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::handler::handle_connection;
use crate::registry::Registry;

/// Source of new bidirectional byte streams
pub trait Acceptor: Send {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Wait for the next stream, with a peer label for logging
    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, String)>> + Send;
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, String)>> + Send {
        async move {
            let (stream, addr) = TcpListener::accept(self).await?;
            Ok((stream, addr.to_string()))
        }
    }
}

/// Shared state handed to every connection task
#[derive(Clone)]
pub struct ChatContext {
    pub registry: Arc<Registry>,
    pub broadcaster: Broadcaster,
    pub audit: Arc<dyn AuditSink>,
    pub config: Arc<ServerConfig>,
    /// Cancelled on process shutdown
    pub shutdown: CancellationToken,
}

impl ChatContext {
    pub fn new(config: ServerConfig, audit: Arc<dyn AuditSink>) -> Self {
        let registry = Arc::new(Registry::new());
        Self {
            broadcaster: Broadcaster::new(registry.clone()),
            registry,
            audit,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }
}

/// The chat server
pub struct ChatServer {
    context: ChatContext,
}

impl ChatServer {
    pub fn new(config: ServerConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            context: ChatContext::new(config, audit),
        }
    }

    pub fn context(&self) -> &ChatContext {
        &self.context
    }

    /// Token that stops the accept loop and every session when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.context.shutdown.clone()
    }

    /// Accept connections until shutdown
    ///
    /// Each stream gets its own task. On shutdown, stops accepting and
    /// waits for every session to finish its teardown.
    pub async fn run<A: Acceptor>(self, mut acceptor: A) {
        let shutdown = self.context.shutdown.clone();
        let mut sessions = JoinSet::new();

        info!("ChatServer started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection task failed: {}", e);
                    }
                }
                accepted = acceptor.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted");
                        let ctx = self.context.clone();
                        sessions.spawn(handle_connection(stream, peer, ctx));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
            }
        }

        let members = self.context.registry.len().await;
        info!(
            sessions = sessions.len(),
            members = members,
            "ChatServer shutting down"
        );
        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                error!("Connection task failed: {}", e);
            }
        }
    }
}
