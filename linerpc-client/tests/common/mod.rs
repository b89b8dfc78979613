//! Common test utilities for linerpc-client integration tests
//!
//! This module provides reusable mock servers and helpers for testing
//! client behavior without needing a real Electrum server.
//!
//! - [`MockLineServer`] is a line-delimited JSON server on a real TCP socket
//! - [`DuplexConnector`] hands the client in-memory streams and gives the test
//!   the server ends, which works with paused tokio time

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use linerpc_client::{BoxedStream, Connector};
use linerpc_core::{Error, Result};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{Framed, FramedRead, LinesCodec};

/// Mock line-delimited JSON-RPC server
///
/// Every inbound line is parsed, forwarded to the test through
/// [`MockLineServer::wait_for_message`] and answered with whatever the
/// handler returns, one line per value.
pub struct MockLineServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    message_rx: mpsc::UnboundedReceiver<Value>,
    push_tx: broadcast::Sender<String>,
    drop_tx: broadcast::Sender<()>,
    connections: Arc<AtomicUsize>,
}

impl MockLineServer {
    /// Start a server answering every request with `"ok"`
    pub async fn new() -> Self {
        Self::with_handler(|request| vec![respond(&request, json!("ok"))]).await
    }

    /// Start a server with a custom handler
    ///
    /// The handler receives each parsed inbound value, single requests and
    /// batch arrays alike, and returns the values to write back.
    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(Value) -> Vec<Value> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handler = Arc::new(handler);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (msg_tx, message_rx) = mpsc::unbounded_channel();
        let (push_tx, _) = broadcast::channel::<String>(64);
        let (drop_tx, _) = broadcast::channel::<()>(8);
        let connections = Arc::new(AtomicUsize::new(0));

        let server_push = push_tx.clone();
        let server_drop = drop_tx.clone();
        let server_connections = Arc::clone(&connections);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        let handler = Arc::clone(&handler);
                        let msg_tx = msg_tx.clone();
                        let mut push_rx = server_push.subscribe();
                        let mut drop_rx = server_drop.subscribe();
                        server_connections.fetch_add(1, Ordering::SeqCst);

                        tokio::spawn(async move {
                            let (read, mut write) = stream.into_split();
                            let mut lines = FramedRead::new(read, LinesCodec::new());

                            loop {
                                tokio::select! {
                                    line = lines.next() => {
                                        let Some(Ok(line)) = line else { break };
                                        let Ok(value) = serde_json::from_str::<Value>(&line) else { continue };
                                        let _ = msg_tx.send(value.clone());

                                        for reply in handler(value) {
                                            let frame = format!("{}\n", reply);
                                            if write.write_all(frame.as_bytes()).await.is_err() {
                                                return;
                                            }
                                        }
                                    }
                                    pushed = push_rx.recv() => {
                                        let Ok(raw) = pushed else { break };
                                        if write.write_all(raw.as_bytes()).await.is_err() {
                                            break;
                                        }
                                    }
                                    _ = drop_rx.recv() => break,
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            message_rx,
            push_tx,
            drop_tx,
            connections,
        }
    }

    /// Get the bound socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the bound port
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Number of connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Write a notification to every open connection
    pub fn notify(&self, method: &str, params: Value) {
        self.push_raw(&format!("{}\n", mock_notification(method, params)));
    }

    /// Write raw bytes to every open connection
    pub fn push_raw(&self, raw: &str) {
        let _ = self.push_tx.send(raw.to_string());
    }

    /// Close every open connection from the server side
    pub fn drop_connections(&self) {
        let _ = self.drop_tx.send(());
    }

    /// Wait for the next inbound value
    ///
    /// Returns None if the server is shut down or the timeout expires.
    pub async fn wait_for_message(&mut self) -> Option<Value> {
        tokio::time::timeout(Duration::from_secs(5), self.message_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Shutdown the mock server
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        self.drop_connections();
    }
}

/// Server end of an in-memory connection
pub struct ServerEnd {
    framed: Framed<DuplexStream, LinesCodec>,
}

impl ServerEnd {
    /// Read the next inbound value
    pub async fn recv_json(&mut self) -> Option<Value> {
        loop {
            let line = self.framed.next().await?.ok()?;
            if let Ok(value) = serde_json::from_str(&line) {
                return Some(value);
            }
        }
    }

    /// Write one value as a line
    pub async fn send_json(&mut self, value: &Value) {
        self.framed.send(value.to_string()).await.unwrap();
    }

    /// Write raw bytes without adding a terminator
    pub async fn send_raw(&mut self, raw: &str) {
        let stream = self.framed.get_mut();
        stream.write_all(raw.as_bytes()).await.unwrap();
        stream.flush().await.unwrap();
    }

    /// Read the next request and answer it with `result`
    pub async fn answer(&mut self, result: Value) -> Value {
        let request = self.recv_json().await.expect("request");
        self.send_json(&respond(&request, result)).await;
        request
    }
}

/// Connector producing in-memory streams
///
/// Each successful connect sends the matching [`ServerEnd`] to the test.
/// With `fail_after(n)`, every attempt after the n-th fails until `heal`
/// is called. Each stream buffers 64 KiB per direction.
pub struct DuplexConnector {
    attempts: AtomicUsize,
    fail_after: Option<usize>,
    healed: AtomicBool,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl DuplexConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        Self::build(None)
    }

    pub fn fail_after(successes: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        Self::build(Some(successes))
    }

    fn build(fail_after: Option<usize>) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            attempts: AtomicUsize::new(0),
            fail_after,
            healed: AtomicBool::new(false),
            servers,
        });
        (connector, rx)
    }

    /// Number of connect attempts so far, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Let every following attempt succeed
    pub fn heal(&self) {
        self.healed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for DuplexConnector {
    async fn connect(&self) -> Result<BoxedStream> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let failing = self.fail_after.map_or(false, |limit| attempt > limit);
        if failing && !self.healed.load(Ordering::SeqCst) {
            return Err(Error::Io("connection refused".to_string()));
        }

        let (client, server) = tokio::io::duplex(64 * 1024);
        let _ = self.servers.send(ServerEnd {
            framed: Framed::new(server, LinesCodec::new()),
        });
        Ok(Box::new(client))
    }

    fn target(&self) -> String {
        "duplex".to_string()
    }
}

/// Build the response to `request` carrying `result`
pub fn respond(request: &Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "result": result
    })
}

/// Build the error response to `request`
pub fn respond_error(request: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "error": {
            "code": code,
            "message": message
        }
    })
}

/// Helper to create a mock notification
pub fn mock_notification(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params
    })
}

/// Poll until `check` holds or a second has passed
pub async fn eventually<F, Fut>(check: F) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
