// tests/integration/relay_test.rs

//! End-to-end tests driving a connection coordinator over an in-memory
//! stream against a scripted backend.

use crate::integration::test_helpers::{
    MockBackend, cmd, fast_path_config, read_frame, spawn_relay, sync_config,
};
use bytes::Bytes;
use futures::SinkExt;
use resp_relay::core::protocol::RespFrame;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;

#[tokio::test]
async fn test_synchronous_roundtrip() {
    let backend = Arc::new(MockBackend::new());
    let mut relay = spawn_relay(sync_config(), backend.clone()).await;

    relay.client.send(cmd(&["GET", "foo"])).await.unwrap();
    let reply = read_frame(&mut relay.client, Duration::from_secs(1)).await;
    assert_eq!(
        reply,
        Some(RespFrame::BulkString(Bytes::from_static(b"foo")))
    );

    // A command with no arguments gets the backend's bare reply.
    relay.client.send(cmd(&["DBSIZE"])).await.unwrap();
    let reply = read_frame(&mut relay.client, Duration::from_secs(1)).await;
    assert_eq!(reply, Some(RespFrame::SimpleString("DONE".to_string())));

    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_fast_path_returns_before_backend_completes() {
    let backend =
        Arc::new(MockBackend::new().with_delay("slow", Duration::from_millis(300)));
    let mut relay = spawn_relay(fast_path_config(), backend.clone()).await;

    let start = Instant::now();
    relay.client.send(cmd(&["SET", "slow", "v"])).await.unwrap();
    let reply = read_frame(&mut relay.client, Duration::from_secs(1)).await;
    assert_eq!(reply, Some(RespFrame::SimpleString("OK".to_string())));
    assert!(
        start.elapsed() < Duration::from_millis(150),
        "synthetic reply must not wait for the backend"
    );

    // The real command still executes; its result is discarded.
    sleep(Duration::from_millis(500)).await;
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    let seen = backend.seen.lock();
    assert_eq!(seen[0].0, "SET");
}

#[tokio::test]
async fn test_fast_path_ignored_in_synchronous_mode() {
    let backend =
        Arc::new(MockBackend::new().with_delay("k", Duration::from_millis(100)));
    let mut relay = spawn_relay(sync_config(), backend.clone()).await;

    let start = Instant::now();
    relay.client.send(cmd(&["SET", "k", "v"])).await.unwrap();
    let reply = read_frame(&mut relay.client, Duration::from_secs(1)).await;

    // The mock echoes the first argument: proof the reply came from the
    // backend, not the synthetic table.
    assert_eq!(reply, Some(RespFrame::BulkString(Bytes::from_static(b"k"))));
    assert!(start.elapsed() >= Duration::from_millis(80));
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() {
    let backend = Arc::new(MockBackend::new());
    let mut relay = spawn_relay(sync_config(), backend.clone()).await;

    // Not an array.
    relay
        .client
        .send(RespFrame::SimpleString("PING".to_string()))
        .await
        .unwrap();
    let reply = read_frame(&mut relay.client, Duration::from_secs(1)).await;
    assert!(matches!(reply, Some(RespFrame::Error(_))));

    // Empty array.
    relay.client.send(RespFrame::Array(vec![])).await.unwrap();
    let reply = read_frame(&mut relay.client, Duration::from_secs(1)).await;
    assert!(matches!(reply, Some(RespFrame::Error(_))));

    // Connection-scoped command the relay cannot honor per client.
    relay.client.send(cmd(&["SELECT", "2"])).await.unwrap();
    let reply = read_frame(&mut relay.client, Duration::from_secs(1)).await;
    assert!(matches!(reply, Some(RespFrame::Error(_))));

    // None of the above reached the backend or closed the connection.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    relay.client.send(cmd(&["GET", "still-alive"])).await.unwrap();
    let reply = read_frame(&mut relay.client, Duration::from_secs(1)).await;
    assert_eq!(
        reply,
        Some(RespFrame::BulkString(Bytes::from_static(b"still-alive")))
    );
}

#[tokio::test]
async fn test_backend_error_is_forwarded_not_fatal() {
    let backend = Arc::new(MockBackend::new().with_failure("GET"));
    let mut relay = spawn_relay(sync_config(), backend.clone()).await;

    relay.client.send(cmd(&["GET", "x"])).await.unwrap();
    let reply = read_frame(&mut relay.client, Duration::from_secs(1)).await;
    match reply {
        Some(RespFrame::Error(msg)) => assert!(msg.starts_with("ERR")),
        other => panic!("expected an error frame, got {other:?}"),
    }

    // The connection survives and later commands still work.
    relay.client.send(cmd(&["HGET", "h", "f"])).await.unwrap();
    let reply = read_frame(&mut relay.client, Duration::from_secs(1)).await;
    assert_eq!(reply, Some(RespFrame::BulkString(Bytes::from_static(b"h"))));
}

#[tokio::test]
async fn test_synchronous_reply_waits_for_earlier_fast_path_units() {
    let backend = Arc::new(
        MockBackend::new()
            .with_delay("a", Duration::from_millis(150))
            .with_delay("b", Duration::from_millis(50))
            .with_delay("c", Duration::from_millis(5)),
    );
    let mut relay = spawn_relay(fast_path_config(), backend.clone()).await;

    let start = Instant::now();
    relay.client.send(cmd(&["SET", "a", "1"])).await.unwrap();
    relay.client.send(cmd(&["SET", "b", "2"])).await.unwrap();
    relay.client.send(cmd(&["GET", "c"])).await.unwrap();

    let first = read_frame(&mut relay.client, Duration::from_secs(1)).await;
    let second = read_frame(&mut relay.client, Duration::from_secs(1)).await;
    assert_eq!(first, Some(RespFrame::SimpleString("OK".to_string())));
    assert_eq!(second, Some(RespFrame::SimpleString("OK".to_string())));

    // The GET's real response is released only after the earlier-sequenced
    // units have completed at the backend.
    let third = read_frame(&mut relay.client, Duration::from_secs(2)).await;
    assert_eq!(third, Some(RespFrame::BulkString(Bytes::from_static(b"c"))));
    assert!(
        start.elapsed() >= Duration::from_millis(140),
        "response for c must wait for a to finish"
    );
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_backpressure_bounds_outstanding_work() {
    // The work queue holds 8 units and one more sits in the single worker:
    // with the backend gated, only the first 9 requests can be admitted and
    // answered; the 10th enqueue blocks the read loop.
    let gate = Arc::new(Semaphore::new(0));
    let backend = Arc::new(MockBackend::new().with_gate(gate.clone()));
    let mut config = fast_path_config();
    config.relay.concurrent_dispatch = false;
    let mut relay = spawn_relay(config, backend.clone()).await;

    for i in 0..20 {
        relay
            .client
            .send(cmd(&["SET", &format!("k{i}"), "v"]))
            .await
            .unwrap();
    }

    let mut early = 0;
    while read_frame(&mut relay.client, Duration::from_millis(300))
        .await
        .is_some()
    {
        early += 1;
    }
    assert_eq!(early, 9, "reads past the queue capacity must block");

    // Releasing the backend drains everything; nothing was dropped.
    gate.add_permits(20);
    let mut late = 0;
    while read_frame(&mut relay.client, Duration::from_millis(500))
        .await
        .is_some()
    {
        late += 1;
    }
    assert_eq!(early + late, 20);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 20);
}

#[tokio::test]
async fn test_read_deadline_expiry_keeps_connection_alive() {
    let backend = Arc::new(MockBackend::new());
    let mut config = sync_config();
    config.read_idle_timeout = Duration::from_millis(50);
    let mut relay = spawn_relay(config, backend.clone()).await;

    // Stay idle well past several deadlines, then issue a command.
    sleep(Duration::from_millis(300)).await;
    relay.client.send(cmd(&["GET", "alive"])).await.unwrap();
    let reply = read_frame(&mut relay.client, Duration::from_secs(1)).await;
    assert_eq!(
        reply,
        Some(RespFrame::BulkString(Bytes::from_static(b"alive")))
    );
}

#[tokio::test]
async fn test_shutdown_signal_closes_connection() {
    let backend = Arc::new(MockBackend::new());
    let mut relay = spawn_relay(sync_config(), backend).await;

    relay.shutdown_tx.send(()).unwrap();
    let reply = read_frame(&mut relay.client, Duration::from_secs(1)).await;
    assert_eq!(reply, None, "stream must close after shutdown");
    relay.handle.await.unwrap();
}
