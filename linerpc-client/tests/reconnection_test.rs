//! Automatic reconnection integration tests
//!
//! These tests run on paused tokio time with in-memory connections, so the
//! reconnect delay elapses instantly once every task is idle.

mod common;

use common::{eventually, DuplexConnector};
use linerpc_client::{ClientBuilder, ConnectionState, PersistencePolicy};
use linerpc_core::Error;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_retry_budget_then_callback() {
    let (connector, mut servers) = DuplexConnector::fail_after(1);
    let exhausted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&exhausted);

    let client = ClientBuilder::new("duplex", 0)
        .connector(connector.clone())
        .keepalive(false)
        .persistence(PersistencePolicy::new(2).with_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .connect()
        .await
        .unwrap();
    let server = servers.recv().await.unwrap();

    drop(server);
    tokio::time::sleep(Duration::from_secs(30)).await;

    // One initial connect plus exactly two automatic attempts
    assert_eq!(connector.attempts(), 3);
    assert_eq!(exhausted.load(Ordering::SeqCst), 1);
    assert_eq!(client.state().await, ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_zero_budget_without_callback_stops() {
    let (connector, mut servers) = DuplexConnector::new();
    let client = ClientBuilder::new("duplex", 0)
        .connector(connector.clone())
        .keepalive(false)
        .max_retry(0)
        .connect()
        .await
        .unwrap();
    let server = servers.recv().await.unwrap();

    drop(server);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(connector.attempts(), 1);
    assert_eq!(client.state().await, ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_delay() {
    let (connector, mut servers) = DuplexConnector::new();
    let client = ClientBuilder::new("duplex", 0)
        .connector(connector.clone())
        .keepalive(false)
        .max_retry(5)
        .connect()
        .await
        .unwrap();
    let server = servers.recv().await.unwrap();

    let dropped_at = Instant::now();
    drop(server);

    let mut server = servers.recv().await.unwrap();
    assert!(dropped_at.elapsed() >= Duration::from_secs(1));
    assert!(dropped_at.elapsed() < Duration::from_secs(2));
    assert_eq!(connector.attempts(), 2);

    // The new session carries traffic
    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.server_banner().await })
    };
    server.answer(json!("back again")).await;
    assert_eq!(call.await.unwrap().unwrap(), json!("back again"));

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_unconditional_reconnect_replays_handshake() {
    let (connector, mut servers) = DuplexConnector::new();
    let client = ClientBuilder::new("duplex", 0)
        .connector(connector.clone())
        .keepalive(false)
        .handshake("wallet", "1.4")
        .build()
        .unwrap();

    let (connected, _) = tokio::join!(client.connect(), async {
        let mut server = servers.recv().await.unwrap();
        server.answer(json!(["ElectrumX 1.16.0", "1.4"])).await;
        // Server goes away right after the handshake
    });
    connected.unwrap();

    for round in 0..3 {
        let mut server = servers.recv().await.unwrap();
        let request = server.answer(json!([format!("ElectrumX round {}", round), "1.4"])).await;
        assert_eq!(request["method"], "server.version");
        assert_eq!(request["params"], json!(["wallet", "1.4"]));
        drop(server);
    }

    let mut server = servers.recv().await.unwrap();
    server.answer(json!(["ElectrumX final", "1.4"])).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(connector.attempts(), 5);
    assert_eq!(client.state().await, ConnectionState::Connected);
    assert_eq!(
        client.server_version_info().await,
        Some(json!(["ElectrumX final", "1.4"]))
    );

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_default_policy_reconnects() {
    let (connector, mut servers) = DuplexConnector::new();
    let client = ClientBuilder::new("duplex", 0)
        .connector(connector.clone())
        .keepalive(false)
        .build()
        .unwrap();
    client.connect().await.unwrap();
    drop(servers.recv().await.unwrap());

    let mut server = servers.recv().await.unwrap();
    assert_eq!(connector.attempts(), 2);

    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.server_ping().await })
    };
    server.answer(json!(null)).await;
    call.await.unwrap().unwrap();

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_reconnect_after_close() {
    let (connector, mut servers) = DuplexConnector::new();
    let client = ClientBuilder::new("duplex", 0)
        .connector(connector.clone())
        .keepalive(false)
        .connect()
        .await
        .unwrap();
    let _server = servers.recv().await.unwrap();

    client.close().await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.attempts(), 1);
    assert_eq!(client.state().await, ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_close_during_reconnect_delay() {
    let (connector, mut servers) = DuplexConnector::new();
    let client = ClientBuilder::new("duplex", 0)
        .connector(connector.clone())
        .keepalive(false)
        .connect()
        .await
        .unwrap();
    drop(servers.recv().await.unwrap());

    tokio::time::sleep(Duration::from_millis(500)).await;
    client.close().await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.attempts(), 1);
    assert_eq!(client.state().await, ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_failed_initial_connect_enters_policy() {
    let (connector, _servers) = DuplexConnector::fail_after(0);
    let exhausted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&exhausted);
    let client = ClientBuilder::new("duplex", 0)
        .connector(connector.clone())
        .keepalive(false)
        .persistence(PersistencePolicy::new(2).with_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .build()
        .unwrap();

    assert!(matches!(client.connect().await, Err(Error::Io(_))));
    tokio::time::sleep(Duration::from_secs(30)).await;

    // The failed connect plus the whole budget, then the callback
    assert_eq!(connector.attempts(), 3);
    assert_eq!(exhausted.load(Ordering::SeqCst), 1);
    assert_eq!(client.state().await, ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_failed_initial_connect_recovers() {
    let (connector, mut servers) = DuplexConnector::fail_after(0);
    let client = ClientBuilder::new("duplex", 0)
        .connector(connector.clone())
        .keepalive(false)
        .build()
        .unwrap();

    assert!(client.connect().await.is_err());
    connector.heal();

    let _server = servers.recv().await.unwrap();
    assert_eq!(connector.attempts(), 2);
    let handle = &client;
    assert!(eventually(|| async move { handle.is_connected().await }).await);

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_builder_connect_not_retried() {
    let (connector, _servers) = DuplexConnector::fail_after(0);
    let result = ClientBuilder::new("duplex", 0)
        .connector(connector.clone())
        .keepalive(false)
        .connect()
        .await;

    assert!(matches!(result, Err(Error::Io(_))));
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_without_reconnect() {
    let (connector, mut servers) = DuplexConnector::new();
    let client = ClientBuilder::new("duplex", 0)
        .connector(connector.clone())
        .keepalive(false)
        .without_reconnect()
        .connect()
        .await
        .unwrap();
    drop(servers.recv().await.unwrap());

    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(connector.attempts(), 1);
    assert_eq!(client.state().await, ConnectionState::Disconnected);

    // A manual connect still works
    client.connect().await.unwrap();
    assert_eq!(connector.attempts(), 2);
    assert!(client.is_connected().await);

    client.close().await;
}
