//! Integration tests for full chat sessions over in-memory and TCP streams.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use line_chat::{handle_connection, AuditEvent, AuditSink, ChatContext, ChatServer, ServerConfig};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// =========================================================================
// Helpers
// =========================================================================

#[derive(Default)]
struct RecordingAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAudit {
    fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
    }

    fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct TestClient<S> {
    lines: Lines<BufReader<ReadHalf<S>>>,
    writer: WriteHalf<S>,
}

impl<S: AsyncRead + AsyncWrite> TestClient<S> {
    fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .expect("write should succeed");
    }

    /// Write bytes as-is, without a line terminator
    async fn send_raw(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await
    }

    /// Next line, or `None` on EOF
    async fn recv(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(2), self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .unwrap_or(None)
    }

    async fn expect(&mut self, line: &str) {
        assert_eq!(self.recv().await.as_deref(), Some(line));
    }

    async fn assert_silent(&mut self) {
        let next = tokio::time::timeout(Duration::from_millis(100), self.lines.next_line()).await;
        assert!(next.is_err(), "unexpected line: {:?}", next);
    }
}

type DuplexClient = TestClient<tokio::io::DuplexStream>;

fn context_with(config: ServerConfig) -> (ChatContext, Arc<RecordingAudit>) {
    let audit = Arc::new(RecordingAudit::default());
    (ChatContext::new(config, audit.clone()), audit)
}

fn context() -> (ChatContext, Arc<RecordingAudit>) {
    context_with(ServerConfig::default())
}

fn connect_with_task(ctx: &ChatContext) -> (DuplexClient, JoinHandle<()>) {
    let (client, server) = tokio::io::duplex(4096);
    let task = tokio::spawn(handle_connection(server, "duplex".to_string(), ctx.clone()));
    (TestClient::new(client), task)
}

fn connect(ctx: &ChatContext) -> DuplexClient {
    connect_with_task(ctx).0
}

async fn login(ctx: &ChatContext, name: &str) -> DuplexClient {
    let mut client = connect(ctx);
    client.send(&format!("LOGIN {}", name)).await;
    client.expect("OK").await;
    client
}

async fn wait_for_audit(audit: &RecordingAudit, kind: &str) {
    for _ in 0..100 {
        if audit.kinds().iter().any(|k| *k == kind) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no {} event recorded", kind);
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_login_and_taken_name() {
    let (ctx, _) = context();
    let mut alice = login(&ctx, "alice").await;

    let mut imposter = connect(&ctx);
    imposter.send("LOGIN alice").await;
    imposter.expect("ERR username-taken").await;
    assert_eq!(imposter.recv().await, None);

    // The original session is untouched
    alice.send("PING").await;
    alice.expect("PONG").await;
    assert!(ctx.registry.contains("alice").await);
}

#[tokio::test]
async fn test_first_line_must_be_login() {
    let (ctx, _) = context();
    let mut client = connect(&ctx);
    client.send("MSG hello").await;
    client.expect("ERR expected 'LOGIN <username>'").await;
    assert_eq!(client.recv().await, None);
}

#[tokio::test]
async fn test_invalid_usernames() {
    let (ctx, _) = context();

    let mut spaced = connect(&ctx);
    spaced.send("LOGIN alice smith").await;
    spaced.expect("ERR invalid-username").await;
    assert_eq!(spaced.recv().await, None);

    let mut empty = connect(&ctx);
    empty.send("LOGIN   ").await;
    empty.expect("ERR invalid-username").await;
    assert_eq!(empty.recv().await, None);

    assert!(ctx.registry.is_empty().await);
}

#[tokio::test]
async fn test_login_keyword_is_case_insensitive() {
    let (ctx, _) = context();
    let mut client = connect(&ctx);
    client.send("login bob").await;
    client.expect("OK").await;
}

#[tokio::test]
async fn test_close_before_login() {
    let (ctx, audit) = context();
    let client = connect(&ctx);
    drop(client);

    wait_for_audit(&audit, "connect").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!audit.kinds().contains(&"login"));
    assert!(ctx.registry.is_empty().await);
}

#[tokio::test]
async fn test_rejected_peer_gone_before_reply() {
    let (ctx, audit) = context();
    let (mut client, task) = connect_with_task(&ctx);
    client.send("LOGIN alice smith").await;
    drop(client);

    // The rejection cannot be written; the connection still ends cleanly
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("connection task should finish")
        .expect("connection task should not panic");

    assert!(audit.events().iter().any(|e| matches!(
        e,
        AuditEvent::Error { detail, .. } if detail.contains("invalid")
    )));
    assert!(!audit.kinds().contains(&"login"));
    assert!(ctx.registry.is_empty().await);
}

// =========================================================================
// Messaging
// =========================================================================

#[tokio::test]
async fn test_broadcast_reaches_others_only() {
    let (ctx, _) = context();
    let mut alice = login(&ctx, "alice").await;

    // Nobody else is here yet
    alice.send("MSG hi").await;
    alice.assert_silent().await;

    let mut bob = login(&ctx, "bob").await;
    bob.assert_silent().await;

    alice.send("MSG hi").await;
    bob.expect("MSG alice hi").await;
    alice.assert_silent().await;

    // Interior whitespace survives, edges are trimmed
    alice.send("msg   two   spaces   ").await;
    bob.expect("MSG alice two   spaces").await;
}

#[tokio::test]
async fn test_empty_msg_and_blank_lines_are_ignored() {
    let (ctx, _) = context();
    let mut alice = login(&ctx, "alice").await;
    let mut bob = login(&ctx, "bob").await;

    alice.send("MSG").await;
    alice.send("").await;
    alice.send("   ").await;
    alice.send("PING").await;
    alice.expect("PONG").await;
    bob.assert_silent().await;
}

#[tokio::test]
async fn test_direct_message() {
    let (ctx, _) = context();
    let mut alice = login(&ctx, "alice").await;
    let mut bob = login(&ctx, "bob").await;
    let mut carol = login(&ctx, "carol").await;

    alice.send("DM bob hello there").await;
    bob.expect("DM alice hello there").await;
    carol.assert_silent().await;
    // No sender echo by default
    alice.assert_silent().await;

    alice.send("DM dave hello").await;
    alice.expect("ERR user-not-found").await;

    alice.send("DM bob").await;
    alice.expect("ERR usage: DM <username> <text>").await;

    alice.send("DM").await;
    alice.expect("ERR usage: DM <username> <text>").await;
}

#[tokio::test]
async fn test_direct_message_echo_when_enabled() {
    let config = ServerConfig {
        dm_echo: true,
        ..ServerConfig::default()
    };
    let (ctx, _) = context_with(config);
    let mut alice = login(&ctx, "alice").await;
    let mut bob = login(&ctx, "bob").await;

    alice.send("DM bob hello").await;
    bob.expect("DM alice hello").await;
    alice.expect("SENT bob hello").await;
}

#[tokio::test]
async fn test_who_lists_each_user_once() {
    let (ctx, _) = context();
    let mut alice = login(&ctx, "alice").await;
    let _bob = login(&ctx, "bob").await;
    let _carol = login(&ctx, "carol").await;

    alice.send("WHO").await;
    let mut users = Vec::new();
    for _ in 0..3 {
        users.push(alice.recv().await.unwrap());
    }
    users.sort();
    assert_eq!(users, vec!["USER alice", "USER bob", "USER carol"]);

    alice.send("PING").await;
    alice.expect("PONG").await;
}

#[tokio::test]
async fn test_unknown_command() {
    let (ctx, _) = context();
    let mut alice = login(&ctx, "alice").await;

    alice.send("SHOUT hello").await;
    alice.expect("ERR unknown-cmd").await;

    alice.send("LOGIN again").await;
    alice.expect("ERR unknown-cmd").await;

    // Still connected
    alice.send("ping").await;
    alice.expect("PONG").await;
}

// =========================================================================
// Teardown
// =========================================================================

#[tokio::test]
async fn test_disconnect_notice_and_name_release() {
    let (ctx, _) = context();
    let mut alice = login(&ctx, "alice").await;
    let bob = login(&ctx, "bob").await;

    drop(bob);
    alice.expect("INFO bob disconnected").await;
    assert!(!ctx.registry.contains("bob").await);

    alice.send("WHO").await;
    alice.expect("USER alice").await;

    // The handle can be claimed again
    let mut bob = login(&ctx, "bob").await;
    alice.send("MSG welcome back").await;
    bob.expect("MSG alice welcome back").await;
}

#[tokio::test]
async fn test_overlong_line_ends_session() {
    let (ctx, audit) = context();
    let mut alice = login(&ctx, "alice").await;
    let mut bob = login(&ctx, "bob").await;

    let mut line = b"MSG ".to_vec();
    line.extend(std::iter::repeat(b'x').take(70 * 1024));
    line.push(b'\n');
    // The server may hang up before the tail is written
    let _ = alice.send_raw(&line).await;

    bob.expect("INFO alice disconnected").await;
    wait_for_audit(&audit, "disconnect").await;
    assert!(!ctx.registry.contains("alice").await);

    // Nothing from the over-long line was relayed
    bob.send("PING").await;
    bob.expect("PONG").await;
}

#[tokio::test]
async fn test_invalid_utf8_ends_session() {
    let (ctx, audit) = context();
    let mut alice = login(&ctx, "alice").await;
    let mut bob = login(&ctx, "bob").await;

    let _ = alice.send_raw(b"MSG \xff\xfe\n").await;

    bob.expect("INFO alice disconnected").await;
    wait_for_audit(&audit, "disconnect").await;
    assert!(!ctx.registry.contains("alice").await);
    assert_eq!(alice.recv().await, None);
}

#[tokio::test]
async fn test_idle_timeout_disconnects() {
    let config = ServerConfig {
        idle_timeout: Duration::from_millis(300),
        ..ServerConfig::default()
    };
    let (ctx, _) = context_with(config);
    let mut idler = login(&ctx, "idler").await;
    let mut watcher = login(&ctx, "watcher").await;

    // Keep the watcher active past the limit while the idler sits quiet.
    // The idler's disconnect notice may land between PONGs.
    let mut notices = Vec::new();
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        watcher.send("PING").await;
        loop {
            let line = watcher.recv().await.expect("watcher should stay connected");
            if line == "PONG" {
                break;
            }
            notices.push(line);
        }
    }

    idler.expect("INFO disconnected due to inactivity").await;
    assert_eq!(idler.recv().await, None);

    if notices.is_empty() {
        notices.push(watcher.recv().await.unwrap());
    }
    assert_eq!(notices, vec!["INFO idler disconnected"]);
    assert!(!ctx.registry.contains("idler").await);
    assert!(ctx.registry.contains("watcher").await);
}

#[tokio::test]
async fn test_audit_events() {
    let (ctx, audit) = context();
    let mut alice = login(&ctx, "alice").await;
    let mut bob = login(&ctx, "bob").await;

    alice.send("MSG hi").await;
    bob.expect("MSG alice hi").await;
    alice.send("DM bob psst").await;
    bob.expect("DM alice psst").await;

    let mut rejected = connect(&ctx);
    rejected.send("HELLO").await;
    rejected.expect("ERR expected 'LOGIN <username>'").await;

    drop(alice);
    bob.expect("INFO alice disconnected").await;
    wait_for_audit(&audit, "disconnect").await;

    let kinds = audit.kinds();
    for kind in ["connect", "login", "message", "dm", "error", "disconnect"] {
        assert!(kinds.contains(&kind), "missing {} in {:?}", kind, kinds);
    }
    assert!(audit.events().contains(&AuditEvent::Dm {
        from: "alice".to_string(),
        to: "bob".to_string(),
        text: "psst".to_string(),
    }));
}

// =========================================================================
// Server over TCP
// =========================================================================

#[tokio::test]
async fn test_tcp_server_and_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = ChatServer::new(ServerConfig::default(), Arc::new(RecordingAudit::default()));
    let ctx = server.context().clone();
    let shutdown = server.shutdown_token();
    let running = tokio::spawn(server.run(listener));

    let mut alice = TestClient::new(TcpStream::connect(addr).await.unwrap());
    alice.send("LOGIN alice").await;
    alice.expect("OK").await;

    let mut bob = TestClient::new(TcpStream::connect(addr).await.unwrap());
    bob.send("LOGIN bob").await;
    bob.expect("OK").await;

    alice.send("MSG over tcp").await;
    bob.expect("MSG alice over tcp").await;

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("server should stop")
        .unwrap();

    // Both sessions were torn down; the stream ends after any notices
    let mut saw_eof = false;
    for _ in 0..3 {
        if alice.recv().await.is_none() {
            saw_eof = true;
            break;
        }
    }
    assert!(saw_eof);
    assert!(ctx.registry.is_empty().await);
}
