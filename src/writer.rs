//! Per-session writer loop
//!
//! Drains a session's mailbox onto its stream in FIFO order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::audit::{AuditEvent, AuditSink};
use crate::session::Outbound;
use crate::types::{ConnectionId, Handle};

/// Run the writer loop until shutdown, mailbox closure or a write error
///
/// A failed write ends the loop without retrying; the dispatcher sees
/// the broken stream on its next read and tears the session down.
pub async fn run_writer(
    connection_id: ConnectionId,
    handle: Handle,
    mut mailbox: mpsc::Receiver<String>,
    outbound: Outbound,
    shutdown: CancellationToken,
    audit: Arc<dyn AuditSink>,
) {
    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            line = mailbox.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        // A stalled client must not hold the loop past shutdown
        let written = tokio::select! {
            _ = shutdown.cancelled() => break,
            written = outbound.send_line(&line) => written,
        };

        if let Err(e) = written {
            debug!(%handle, error = %e, "write failed, ending writer loop");
            audit.record(AuditEvent::Error {
                conn: connection_id.to_string(),
                detail: format!("write to {} failed: {}", handle, e),
            });
            break;
        }
    }

    debug!(%handle, "writer loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, BufReader};

    use crate::audit::tests::MemoryAudit;

    fn handle(name: &str) -> Handle {
        Handle::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_writer_drains_in_order() {
        let (client, server) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(run_writer(
            ConnectionId::new(),
            handle("bob"),
            rx,
            Outbound::new(server),
            shutdown.clone(),
            Arc::new(MemoryAudit::default()),
        ));

        tx.send("MSG alice one".to_string()).await.unwrap();
        tx.send("MSG alice two".to_string()).await.unwrap();

        let mut lines = BufReader::new(client).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "MSG alice one");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "MSG alice two");

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_stops_on_signal_with_open_mailbox() {
        let (_client, server) = tokio::io::duplex(64);
        let (tx, rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(run_writer(
            ConnectionId::new(),
            handle("bob"),
            rx,
            Outbound::new(server),
            shutdown.clone(),
            Arc::new(MemoryAudit::default()),
        ));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("writer should stop while the sender is still alive")
            .unwrap();
        drop(tx);
    }

    #[tokio::test]
    async fn test_writer_stops_on_write_failure() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);

        let (tx, rx) = mpsc::channel(8);
        let audit = Arc::new(MemoryAudit::default());
        let task = tokio::spawn(run_writer(
            ConnectionId::new(),
            handle("bob"),
            rx,
            Outbound::new(server),
            CancellationToken::new(),
            audit.clone(),
        ));

        tx.send("MSG alice hi".to_string()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("writer should stop after a broken write")
            .unwrap();

        assert!(audit
            .events()
            .iter()
            .any(|e| matches!(e, AuditEvent::Error { .. })));
    }
}
