//! Electrum protocol methods
//!
//! Thin wrappers mapping each Electrum method onto [`LineRpcClient::request`]
//! or [`LineRpcClient::request_batch`]. Results are returned as raw JSON; use
//! `request_typed` or `BatchResponse::get` to decode into your own types.
//!
//! Subscription methods only issue the request and return the initial
//! status. Listen for updates with `on_notification` on the method name, or
//! use [`LineRpcClient::subscribe`] to do both at once.

use crate::batch::BatchResponse;
use crate::LineRpcClient;
use linerpc_core::Result;
use serde_json::Value;

/// Subscription topics whose listeners should not outlive a connection
pub const SUBSCRIPTION_TOPICS: [&str; 2] = ["blockchain.headers.subscribe", "blockchain.scripthash.subscribe"];

fn strings<I, S>(items: I) -> Vec<Value>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(|s| Value::String(s.into())).collect()
}

impl LineRpcClient {
    /// `server.version [client, protocol_version]`
    pub async fn server_version(&self, client_name: &str, protocol_version: &str) -> Result<Value> {
        self.request("server.version", vec![client_name.into(), protocol_version.into()])
            .await
    }

    pub async fn server_banner(&self) -> Result<Value> {
        self.request("server.banner", vec![]).await
    }

    pub async fn server_features(&self) -> Result<Value> {
        self.request("server.features", vec![]).await
    }

    pub async fn server_ping(&self) -> Result<Value> {
        self.request("server.ping", vec![]).await
    }

    /// `server.add_peer [features]`
    pub async fn server_add_peer(&self, features: Value) -> Result<Value> {
        self.request("server.add_peer", vec![features]).await
    }

    pub async fn server_donation_address(&self) -> Result<Value> {
        self.request("server.donation_address", vec![]).await
    }

    pub async fn server_peers_subscribe(&self) -> Result<Value> {
        self.request("server.peers.subscribe", vec![]).await
    }

    pub async fn blockchain_address_get_proof(&self, address: &str) -> Result<Value> {
        self.request("blockchain.address.get_proof", vec![address.into()])
            .await
    }

    pub async fn blockchain_scripthash_get_balance(&self, scripthash: &str) -> Result<Value> {
        self.request("blockchain.scripthash.get_balance", vec![scripthash.into()])
            .await
    }

    /// Balances of several script hashes in one batch
    pub async fn blockchain_scripthash_get_balance_batch<I, S>(&self, scripthashes: I) -> Result<BatchResponse>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request_batch("blockchain.scripthash.get_balance", strings(scripthashes), None)
            .await
    }

    pub async fn blockchain_scripthash_listunspent(&self, scripthash: &str) -> Result<Value> {
        self.request("blockchain.scripthash.listunspent", vec![scripthash.into()])
            .await
    }

    /// Unspent outputs of several script hashes in one batch
    pub async fn blockchain_scripthash_listunspent_batch<I, S>(&self, scripthashes: I) -> Result<BatchResponse>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request_batch("blockchain.scripthash.listunspent", strings(scripthashes), None)
            .await
    }

    pub async fn blockchain_scripthash_get_history(&self, scripthash: &str) -> Result<Value> {
        self.request("blockchain.scripthash.get_history", vec![scripthash.into()])
            .await
    }

    /// Histories of several script hashes in one batch
    pub async fn blockchain_scripthash_get_history_batch<I, S>(&self, scripthashes: I) -> Result<BatchResponse>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request_batch("blockchain.scripthash.get_history", strings(scripthashes), None)
            .await
    }

    pub async fn blockchain_scripthash_get_mempool(&self, scripthash: &str) -> Result<Value> {
        self.request("blockchain.scripthash.get_mempool", vec![scripthash.into()])
            .await
    }

    /// Subscribe to status changes of a script hash; returns the current status
    pub async fn blockchain_scripthash_subscribe(&self, scripthash: &str) -> Result<Value> {
        self.request("blockchain.scripthash.subscribe", vec![scripthash.into()])
            .await
    }

    pub async fn blockchain_block_header(&self, height: u64) -> Result<Value> {
        self.request("blockchain.block.header", vec![height.into()]).await
    }

    /// `count` consecutive headers starting at `start_height`
    pub async fn blockchain_block_headers(&self, start_height: u64, count: u64) -> Result<Value> {
        self.request("blockchain.block.headers", vec![start_height.into(), count.into()])
            .await
    }

    /// Fee estimate for confirmation within `blocks` blocks
    pub async fn blockchain_estimatefee(&self, blocks: u32) -> Result<Value> {
        self.request("blockchain.estimatefee", vec![blocks.into()]).await
    }

    /// Subscribe to new block headers; returns the current tip
    pub async fn blockchain_headers_subscribe(&self) -> Result<Value> {
        self.request("blockchain.headers.subscribe", vec![]).await
    }

    pub async fn blockchain_relayfee(&self) -> Result<Value> {
        self.request("blockchain.relayfee", vec![]).await
    }

    pub async fn blockchain_transaction_broadcast(&self, raw_tx: &str) -> Result<Value> {
        self.request("blockchain.transaction.broadcast", vec![raw_tx.into()])
            .await
    }

    /// Raw or, with `verbose`, decoded transaction
    pub async fn blockchain_transaction_get(&self, tx_hash: &str, verbose: bool) -> Result<Value> {
        self.request("blockchain.transaction.get", vec![tx_hash.into(), verbose.into()])
            .await
    }

    /// Several transactions in one batch
    ///
    /// `verbose` is sent as the second parameter of every call when given.
    pub async fn blockchain_transaction_get_batch<I, S>(&self, tx_hashes: I, verbose: Option<bool>) -> Result<BatchResponse>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request_batch("blockchain.transaction.get", strings(tx_hashes), verbose.map(Value::Bool))
            .await
    }

    pub async fn blockchain_transaction_get_merkle(&self, tx_hash: &str, height: u64) -> Result<Value> {
        self.request("blockchain.transaction.get_merkle", vec![tx_hash.into(), height.into()])
            .await
    }

    pub async fn mempool_get_fee_histogram(&self) -> Result<Value> {
        self.request("mempool.get_fee_histogram", vec![]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strings_to_params() {
        assert_eq!(strings(["a", "b"]), vec![json!("a"), json!("b")]);
        assert!(strings(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn test_subscription_topics() {
        assert!(SUBSCRIPTION_TOPICS.contains(&"blockchain.headers.subscribe"));
        assert!(SUBSCRIPTION_TOPICS.contains(&"blockchain.scripthash.subscribe"));
    }
}
