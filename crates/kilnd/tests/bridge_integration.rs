//! Integration tests for the bridge as a complete system.
//!
//! These tests run the real pipeline - framed serial stream, coordinator,
//! repository, broadcaster - over an in-memory duplex stream standing in for
//! the serial port, and a temp-dir document store standing in for the
//! on-disk history.
//!
//! Tests CAN use `.unwrap()` and `.expect()`; the panic-free policy applies
//! to production code only.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use kiln_core::{SessionStatus, StatusSnapshot, UNKNOWN_STATE};
use kiln_protocol::InboundMessage;
use kilnd::broadcaster::StatusBroadcaster;
use kilnd::coordinator::SessionCoordinator;
use kilnd::link::HardwareLink;
use kilnd::repository::SessionRepository;
use kilnd::service::KilnService;
use kilnd::store::DocumentStore;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for any single expected snapshot or wire read.
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Test Helpers
// ============================================================================

/// A fully wired bridge talking to a fake controller over a duplex stream.
struct TestBridge {
    service: KilnService,
    /// The controller's end of the "serial line".
    controller: DuplexStream,
    cancel_token: CancellationToken,
    _temp_dir: TempDir, // Keep alive for RAII cleanup
}

impl TestBridge {
    async fn spawn() -> Self {
        Self::spawn_with_ack_observer(None).await
    }

    async fn spawn_with_ack_observer(observer: Option<mpsc::Sender<InboundMessage>>) -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let store = DocumentStore::open(temp_dir.path().join("history.json"));
        let repository = Arc::new(SessionRepository::load(store).await.expect("load history"));
        let broadcaster = StatusBroadcaster::new();

        let (bridge_side, controller) = tokio::io::duplex(1024);
        let (link, messages) = HardwareLink::from_stream(bridge_side);

        let mut coordinator =
            SessionCoordinator::new(Arc::clone(&repository), Arc::clone(&broadcaster));
        if let Some(observer) = observer {
            coordinator.set_ack_observer(observer);
        }

        let cancel_token = CancellationToken::new();
        tokio::spawn(coordinator.run(messages, cancel_token.clone()));

        let service = KilnService::new(repository, broadcaster, link);

        Self {
            service,
            controller,
            cancel_token,
            _temp_dir: temp_dir,
        }
    }

    /// Emits one CRLF-terminated line from the fake controller.
    async fn emit(&mut self, line: &str) {
        self.controller
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .expect("controller write");
    }

    /// Reads one line-feed terminated command from the bridge.
    async fn next_command(&mut self) -> serde_json::Value {
        let mut raw = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let read = timeout(RECV_TIMEOUT, self.controller.read(&mut byte))
                .await
                .expect("timed out waiting for command")
                .expect("controller read");
            assert_ne!(read, 0, "bridge closed the line");
            if byte[0] == b'\n' {
                break;
            }
            raw.push(byte[0]);
        }
        serde_json::from_slice(&raw).expect("command is one JSON line")
    }
}

impl Drop for TestBridge {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Receives the next snapshot or fails the test.
async fn next_snapshot(sub: &mut kilnd::StatusSubscription) -> StatusSnapshot {
    timeout(RECV_TIMEOUT, sub.recv())
        .await
        .expect("timed out waiting for snapshot")
        .expect("broadcaster gone")
}

/// Polls until `cond` holds. Snapshots are published before history writes
/// land, so history assertions synchronize here instead of on the broadcast.
async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_full_firing_recorded_and_broadcast() {
    let mut bridge = TestBridge::spawn().await;
    let mut sub = bridge.service.subscribe_status();

    // Joining before any hardware message: the snapshot is UNKNOWN
    let initial = next_snapshot(&mut sub).await;
    assert_eq!(initial.state(), Some(UNKNOWN_STATE));

    bridge.emit(r#"{"state":"STARTING"}"#).await;
    bridge.emit(r#"{"state":"RUNNING","input":10}"#).await;
    bridge.emit(r#"{"state":"RUNNING","input":50}"#).await;
    bridge.emit(r#"{"state":"COMPLETED"}"#).await;

    // Every message reaches live observers, terminal one included
    for expected in ["STARTING", "RUNNING", "RUNNING", "COMPLETED"] {
        let snapshot = next_snapshot(&mut sub).await;
        assert_eq!(snapshot.state(), Some(expected));
        assert!(snapshot.timestamp > 0);
    }

    // Exactly one session: COMPLETED, finalized, three recorded events
    let service = bridge.service.clone();
    wait_until("session to finalize", || {
        service
            .history()
            .first()
            .is_some_and(|s| s.end_time.is_some())
    })
    .await;
    let history = bridge.service.history();
    assert_eq!(history.len(), 1);
    let session = &history[0];
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.end_time.is_some());
    assert_eq!(session.events.len(), 3);

    // The latest snapshot is queryable without subscribing
    assert_eq!(bridge.service.latest_status().state(), Some("COMPLETED"));
}

#[tokio::test]
async fn test_boot_noise_is_tolerated() {
    let mut bridge = TestBridge::spawn().await;
    let mut sub = bridge.service.subscribe_status();
    let _initial = next_snapshot(&mut sub).await;

    // The controller prints plain text while booting
    bridge.emit("Kiln controller v0.1.2 booting").await;
    bridge.emit("").await;
    bridge.emit(r#"{"state":"IDLE","input":21.0}"#).await;

    // Only the JSON line comes through
    let snapshot = next_snapshot(&mut sub).await;
    assert_eq!(snapshot.state(), Some("IDLE"));
    assert!(bridge.service.history().is_empty());
}

#[tokio::test]
async fn test_commands_reach_the_controller() {
    let mut bridge = TestBridge::spawn().await;

    bridge.service.send_start().await;
    let cmd = bridge.next_command().await;
    assert_eq!(cmd, serde_json::json!({ "command": "start" }));

    bridge.service.send_profile(1050.0, 90.0, 20.0, 120.0).await;
    let cmd = bridge.next_command().await;
    assert_eq!(cmd["command"], "profile");
    assert_eq!(cmd["targetTemperature"], 1050.0);
    assert_eq!(cmd["rampTime"], 90.0);

    bridge.service.send_test(600.0, Some(30.0), None).await;
    let cmd = bridge.next_command().await;
    assert_eq!(cmd["command"], "testInput");
    assert_eq!(cmd["duration"], 30.0);
    assert!(cmd.get("setPoint").is_none());

    bridge.service.send_stop().await;
    let cmd = bridge.next_command().await;
    assert_eq!(cmd, serde_json::json!({ "command": "stop" }));
}

#[tokio::test]
async fn test_acks_go_to_the_observer_only() {
    let (ack_tx, mut ack_rx) = mpsc::channel(4);
    let mut bridge = TestBridge::spawn_with_ack_observer(Some(ack_tx)).await;
    let mut sub = bridge.service.subscribe_status();
    let _initial = next_snapshot(&mut sub).await;

    bridge.service.send_start().await;
    let _cmd = bridge.next_command().await;
    bridge.emit(r#"{"status":"ok"}"#).await;

    let ack = timeout(RECV_TIMEOUT, ack_rx.recv())
        .await
        .expect("timed out waiting for ack")
        .expect("observer channel closed");
    assert_eq!(ack.ack(), Some("ok"));

    // The ack is invisible to live status and history
    bridge.emit(r#"{"state":"IDLE"}"#).await;
    let snapshot = next_snapshot(&mut sub).await;
    assert_eq!(snapshot.state(), Some("IDLE"));
    assert!(bridge.service.history().is_empty());
}

#[tokio::test]
async fn test_clear_history_empties_store_and_disk() {
    let mut bridge = TestBridge::spawn().await;
    let mut sub = bridge.service.subscribe_status();
    let _initial = next_snapshot(&mut sub).await;

    bridge.emit(r#"{"state":"STARTING"}"#).await;
    bridge.emit(r#"{"state":"COMPLETED"}"#).await;
    let _ = next_snapshot(&mut sub).await;
    let _ = next_snapshot(&mut sub).await;

    let service = bridge.service.clone();
    wait_until("session to finalize", || {
        service
            .history()
            .first()
            .is_some_and(|s| s.end_time.is_some())
    })
    .await;
    assert_eq!(bridge.service.history().len(), 1);

    bridge.service.clear_history().await.expect("clear");
    assert!(bridge.service.history().is_empty());
}

#[tokio::test]
async fn test_history_survives_daemon_restart() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let path = temp_dir.path().join("history.json");

    // First "daemon run": one aborted firing
    {
        let store = DocumentStore::open(&path);
        let repository = Arc::new(SessionRepository::load(store).await.expect("load"));
        let broadcaster = StatusBroadcaster::new();

        let (bridge_side, mut controller) = tokio::io::duplex(1024);
        let (_link, messages) = HardwareLink::from_stream(bridge_side);
        let coordinator = SessionCoordinator::new(Arc::clone(&repository), broadcaster);
        let task = tokio::spawn(coordinator.run(messages, CancellationToken::new()));

        controller
            .write_all(b"{\"state\":\"STARTING\"}\r\n{\"state\":\"ABORTED\"}\r\n")
            .await
            .unwrap();
        drop(controller);
        timeout(RECV_TIMEOUT, task).await.expect("coordinator exit").unwrap();
    }

    // Second run sees the recorded firing
    let store = DocumentStore::open(&path);
    let repository = SessionRepository::load(store).await.expect("reload");
    let sessions = repository.list_sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, SessionStatus::Aborted);
    assert_eq!(sessions[0].events.len(), 1);
}
