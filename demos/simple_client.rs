//! Simple Electrum client example
//!
//! Connects over plain TCP, performs the version handshake and calls a few
//! server methods, one of them as a batch.
//!
//! ```bash
//! cargo run --example simple_client -- 127.0.0.1 50001
//! ```

use linerpc::ClientBuilder;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = args.next().map(|p| p.parse()).transpose()?.unwrap_or(50001);

    println!("Connecting to Electrum server at tcp://{}:{}", host, port);

    let client = ClientBuilder::new(host, port)
        .handshake("linerpc-example", "1.4")
        .without_reconnect()
        .connect()
        .await?;

    if let Some(version) = client.server_version_info().await {
        println!("Connected! Server version: {}\n", version);
    }

    println!("server.banner = {}", client.server_banner().await?);
    println!("blockchain.estimatefee(6) = {}", client.blockchain_estimatefee(6).await?);
    println!("blockchain.relayfee = {}", client.blockchain_relayfee().await?);

    // One frame, one call per scripthash
    let scripthashes = [
        "8b01df4e368ea28f8dc0423bcf7a4923e3a12d307c875e47a0cfbf90b5c39161",
        "9f8c4e1d4b5f3b0a7c1e2d3f4a5b6c7d8e9f0a1b2c3d4e5f60718293a4b5c6d7",
    ];
    let balances = client.blockchain_scripthash_get_balance_batch(scripthashes).await?;
    for (scripthash, balance) in balances.results() {
        match balance {
            Ok(balance) => println!("balance({}) = {}", scripthash, balance),
            Err(e) => println!("balance({}) failed: {}", scripthash, e),
        }
    }

    client.close().await;
    println!("\nAll requests completed successfully!");

    Ok(())
}
