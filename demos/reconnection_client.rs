//! Example demonstrating automatic reconnection
//!
//! The client follows the chain tip and keeps a retry budget for lost
//! connections. Stop and restart the server to watch it reconnect; once the
//! budget is spent the callback fires and the client stays down.
//!
//! ```bash
//! cargo run --example reconnection_client -- 127.0.0.1 50001
//! ```

use linerpc::{ClientBuilder, PersistencePolicy};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = args.next().map(|p| p.parse()).transpose()?.unwrap_or(50001);

    println!("=== Automatic Reconnection Example ===\n");

    let policy = PersistencePolicy::new(5).with_callback(|| {
        eprintln!("Retry budget exhausted, giving up");
    });

    let client = ClientBuilder::new(host, port)
        .handshake("linerpc-example", "1.4")
        .persistence(policy)
        .reconnect_delay(Duration::from_secs(2))
        .electrum_teardown()
        .connect()
        .await?;

    println!("Connected, subscribing to block headers...");
    let mut headers = client.notifications("blockchain.headers.subscribe").await;
    let tip = client.blockchain_headers_subscribe().await?;
    println!("Current tip: {}\n", tip);

    println!("Press Ctrl+C to exit.\n");
    let mut resubscribe = false;
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            header = headers.recv() => match header {
                Some(header) => println!("New block: {}", header),
                None => {
                    // Teardown dropped the listener along with the connection
                    println!("Header subscription lost");
                    headers = client.notifications("blockchain.headers.subscribe").await;
                    resubscribe = true;
                }
            },
            _ = ticker.tick() => {
                println!("Connection state: {:?}", client.state().await);
                if resubscribe && client.is_connected().await {
                    match client.blockchain_headers_subscribe().await {
                        Ok(tip) => {
                            println!("Resubscribed, tip: {}", tip);
                            resubscribe = false;
                        }
                        Err(e) => println!("Resubscribe failed: {}", e),
                    }
                }
            }
        }
    }

    client.close().await;
    Ok(())
}
