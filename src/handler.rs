//! Connection handler
//!
//! Runs the per-connection state machine: the LOGIN handshake, command
//! dispatch while authenticated, and teardown.
//!
//! ```text
//! Unauthenticated ──(LOGIN ok)──→ Authenticated
//!        │                             │
//!        └───(bad first line, EOF)──┐  └──(EOF, read error, idle, shutdown)
//!                                   ▼                  ▼
//!                               Terminated ◄───────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audit::AuditEvent;
use crate::error::ChatError;
use crate::idle::IdleMonitor;
use crate::message::{clean_line, parse_login, Command, ServerLine};
use crate::server::ChatContext;
use crate::session::{Outbound, Session};
use crate::types::{ConnectionId, Handle};
use crate::writer::run_writer;

/// Longest accepted inbound line, in bytes
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Upper bound on writes made while closing a connection
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Handle a newly accepted stream
///
/// Returns once the session is terminated. Transport errors, including
/// a peer that leaves before reading its handshake reply, end the
/// session quietly.
pub async fn handle_connection<S>(stream: S, peer: String, ctx: ChatContext)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let connection_id = ConnectionId::new();
    info!(conn = %connection_id, %peer, "connection opened");
    ctx.audit.record(AuditEvent::Connect {
        conn: connection_id.to_string(),
        peer,
    });

    let (reader, writer) = tokio::io::split(stream);
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let outbound = Outbound::new(writer);

    // Idle expiry and server shutdown both land here
    let closed = ctx.shutdown.child_token();

    if let Some(session) = login(connection_id, &mut lines, &outbound, &closed, &ctx).await {
        run_session(session, &mut lines, &closed, &ctx).await;
    }

    if time::timeout(CLOSE_GRACE, outbound.close()).await.is_err() {
        debug!(conn = %connection_id, "close timed out");
    }
    debug!(conn = %connection_id, "connection closed");
}

/// Read the next line, or `None` once the connection is finished
async fn next_line<R>(
    lines: &mut FramedRead<R, LinesCodec>,
    closed: &CancellationToken,
) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    tokio::select! {
        _ = closed.cancelled() => None,
        next = lines.next() => match next {
            Some(Ok(line)) => Some(line),
            Some(Err(e)) => {
                debug!(error = %e, "read failed");
                None
            }
            None => None,
        },
    }
}

/// Unauthenticated state
///
/// The first line decides: a registered session, or termination.
async fn login<R>(
    connection_id: ConnectionId,
    lines: &mut FramedRead<R, LinesCodec>,
    outbound: &Outbound,
    closed: &CancellationToken,
    ctx: &ChatContext,
) -> Option<(Arc<Session>, mpsc::Receiver<String>)>
where
    R: AsyncRead + Unpin,
{
    let Some(raw) = next_line(lines, closed).await else {
        debug!(conn = %connection_id, "closed before login");
        return None;
    };

    let handle = match parse_login(&clean_line(&raw)) {
        Ok(handle) => handle,
        Err(e) => {
            reject(connection_id, outbound, e, ctx).await;
            return None;
        }
    };

    let (session, mailbox) = Session::new(
        connection_id,
        handle.clone(),
        outbound.clone(),
        closed.child_token(),
    );
    let session = Arc::new(session);

    if ctx.registry.register(session.clone()).await.is_err() {
        reject(
            connection_id,
            outbound,
            ChatError::UsernameTaken(handle.to_string()),
            ctx,
        )
        .await;
        return None;
    }

    info!(conn = %connection_id, %handle, "logged in");
    ctx.audit.record(AuditEvent::Login {
        conn: connection_id.to_string(),
        handle: handle.to_string(),
    });

    if let Err(e) = outbound.send_line(ServerLine::Ok).await {
        // Registered but unreachable: undo and leave quietly
        ctx.registry.unregister(handle.as_str()).await;
        debug!(conn = %connection_id, error = %e, "failed to acknowledge login");
        return None;
    }

    Some((session, mailbox))
}

/// Report a handshake failure; the connection is closed afterwards
async fn reject(connection_id: ConnectionId, outbound: &Outbound, err: ChatError, ctx: &ChatContext) {
    warn!(conn = %connection_id, error = %err, "login rejected");
    ctx.audit.record(AuditEvent::Error {
        conn: connection_id.to_string(),
        detail: err.to_string(),
    });
    // The peer may already be gone; that is just a disconnect
    if let Err(e) = outbound.send_line(ServerLine::from(err)).await {
        debug!(conn = %connection_id, error = %e, "failed to send rejection");
    }
}

/// Authenticated state, through to teardown
async fn run_session<R>(
    (session, mailbox): (Arc<Session>, mpsc::Receiver<String>),
    lines: &mut FramedRead<R, LinesCodec>,
    closed: &CancellationToken,
    ctx: &ChatContext,
) where
    R: AsyncRead + Unpin,
{
    let handle = session.handle.clone();
    let outbound = session.outbound();

    let writer = tokio::spawn(run_writer(
        session.connection_id,
        handle.clone(),
        mailbox,
        outbound.clone(),
        session.shutdown_token(),
        ctx.audit.clone(),
    ));

    let idle = IdleMonitor::spawn(ctx.config.idle_timeout, {
        let outbound = outbound.clone();
        let closed = closed.clone();
        let handle = handle.clone();
        async move {
            info!(%handle, "idle timeout");
            let _ = time::timeout(CLOSE_GRACE, outbound.send_line(ServerLine::Inactive)).await;
            closed.cancel();
        }
    });

    while let Some(raw) = next_line(lines, closed).await {
        let line = clean_line(&raw);
        if line.is_empty() {
            continue;
        }
        idle.reset();

        let reply = tokio::select! {
            _ = closed.cancelled() => break,
            reply = respond(&session, &line, ctx) => reply,
        };

        if let Err(e) = reply {
            debug!(%handle, error = %e, "reply failed");
            break;
        }
    }

    // Terminated
    idle.stop();
    ctx.registry.unregister(handle.as_str()).await;
    ctx.broadcaster
        .broadcast(None, &ServerLine::Disconnected(handle.to_string()).to_string())
        .await;
    session.terminate();
    if let Err(e) = writer.await {
        warn!(%handle, error = %e, "writer task failed");
    }

    info!(%handle, "disconnected");
    ctx.audit.record(AuditEvent::Disconnect {
        handle: handle.to_string(),
    });
}

/// Parse one line and act on it
async fn respond(session: &Session, line: &str, ctx: &ChatContext) -> Result<(), ChatError> {
    match Command::parse(line) {
        Ok(command) => dispatch(session, command, ctx).await,
        Err(e) => {
            debug!(handle = %session.handle, error = %e, "bad command");
            session.outbound().send_line(ServerLine::from(e)).await
        }
    }
}

/// Route one authenticated command
async fn dispatch(session: &Session, command: Command, ctx: &ChatContext) -> Result<(), ChatError> {
    let sender = &session.handle;
    let outbound = session.outbound();
    match command {
        Command::Msg { text } => {
            if text.is_empty() {
                return Ok(());
            }
            let line = ServerLine::Msg {
                from: sender.to_string(),
                text: text.clone(),
            };
            let delivery = ctx
                .broadcaster
                .broadcast(Some(sender.as_str()), &line.to_string())
                .await;
            debug!(%sender, delivered = delivery.delivered, dropped = delivery.dropped, "broadcast");
            ctx.audit.record(AuditEvent::Message {
                from: sender.to_string(),
                text,
            });
            Ok(())
        }
        Command::Who => {
            let users = ctx.registry.snapshot().await;
            outbound
                .send_lines(users.into_iter().map(ServerLine::User))
                .await
        }
        Command::Ping => outbound.send_line(ServerLine::Pong).await,
        Command::Dm { target, text } => direct_message(sender, target, text, outbound, ctx).await,
    }
}

async fn direct_message(
    sender: &Handle,
    target: String,
    text: String,
    outbound: &Outbound,
    ctx: &ChatContext,
) -> Result<(), ChatError> {
    let line = ServerLine::Dm {
        from: sender.to_string(),
        text: text.clone(),
    };

    if ctx.broadcaster.send_to(&target, &line.to_string()).await.is_none() {
        return outbound
            .send_line(ServerLine::from(ChatError::UserNotFound(target)))
            .await;
    }

    ctx.audit.record(AuditEvent::Dm {
        from: sender.to_string(),
        to: target.clone(),
        text: text.clone(),
    });

    if ctx.config.dm_echo {
        outbound.send_line(ServerLine::DmSent { to: target, text }).await?;
    }
    Ok(())
}
