//! Session and outbound stream definitions
//!
//! A `Session` is one authenticated connection: its handle, its bounded
//! outbound mailbox and the shared writer for its stream.

use std::fmt;
use std::sync::Arc;

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::{FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;

use crate::error::{ChatError, DeliveryError};
use crate::types::{ConnectionId, Handle};

/// Mailbox capacity per session
pub const MAILBOX_CAPACITY: usize = 32;

/// Type-erased write half of a connection
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Serialized line writer for one connection
///
/// Cloneable; every clone writes through the same mutex, so lines from
/// the writer loop and direct replies never interleave mid-line.
#[derive(Clone)]
pub struct Outbound {
    inner: Arc<Mutex<FramedWrite<BoxedWriter, LinesCodec>>>,
}

impl Outbound {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: BoxedWriter = Box::new(writer);
        Self {
            inner: Arc::new(Mutex::new(FramedWrite::new(writer, LinesCodec::new()))),
        }
    }

    /// Write one newline-terminated line and flush
    pub async fn send_line(&self, line: impl fmt::Display) -> Result<(), ChatError> {
        let mut sink = self.inner.lock().await;
        sink.send(line.to_string()).await?;
        Ok(())
    }

    /// Write several lines back to back under a single lock, then flush
    pub async fn send_lines<I>(&self, lines: I) -> Result<(), ChatError>
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        let mut sink = self.inner.lock().await;
        for line in lines {
            sink.feed(line.to_string()).await?;
        }
        SinkExt::<String>::flush(&mut *sink).await?;
        Ok(())
    }

    /// Flush and shut down the write side
    ///
    /// Safe to call more than once; errors from an already-closed
    /// stream are ignored.
    pub async fn close(&self) {
        let mut sink = self.inner.lock().await;
        let _ = SinkExt::<String>::close(&mut *sink).await;
    }
}

impl fmt::Debug for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbound").finish_non_exhaustive()
    }
}

/// One authenticated connection
///
/// Producers (any dispatcher) enqueue through [`Session::try_deliver`];
/// the single consumer is this session's writer loop.
#[derive(Debug)]
pub struct Session {
    /// Connection this session was authenticated on
    pub connection_id: ConnectionId,
    /// Unique handle
    pub handle: Handle,
    /// Outbound mailbox (bounded, drop on full)
    mailbox: mpsc::Sender<String>,
    /// Shared writer for the underlying stream
    outbound: Outbound,
    /// Raised on teardown to stop the writer loop
    shutdown: CancellationToken,
}

impl Session {
    /// Create a session and the receiving end of its mailbox
    pub fn new(
        connection_id: ConnectionId,
        handle: Handle,
        outbound: Outbound,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::Receiver<String>) {
        let (mailbox, receiver) = mpsc::channel(MAILBOX_CAPACITY);
        let session = Self {
            connection_id,
            handle,
            mailbox,
            outbound,
            shutdown,
        };
        (session, receiver)
    }

    /// Non-blocking enqueue onto the mailbox
    ///
    /// Never waits: a full mailbox rejects the newest line.
    pub fn try_deliver(&self, line: impl Into<String>) -> Result<(), DeliveryError> {
        self.mailbox.try_send(line.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::MailboxFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::MailboxClosed,
        })
    }

    pub fn handle(&self) -> &str {
        self.handle.as_str()
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal the writer loop to stop
    pub fn terminate(&self) {
        self.shutdown.cancel();
    }
}
