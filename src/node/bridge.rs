use super::binding::ChainCallbacks;
use crate::chain::{ActivityCallback, ChainWatcher, FeeEstimates, TransactionData, TxHistoryItem};
use crate::error::{Error, Result};
use crate::keys::ReceiveAddresses;
use crate::types::Header;
use async_trait::async_trait;
use bitcoin::ScriptBuf;
use std::sync::Arc;
use tracing::debug;

/// Chain callbacks backed by the watcher and the receive-address allocator.
pub struct ChainBridge {
    chain: Arc<ChainWatcher>,
    addresses: Arc<ReceiveAddresses>,
    on_activity: ActivityCallback,
}

impl ChainBridge {
    pub fn new(chain: Arc<ChainWatcher>, addresses: Arc<ReceiveAddresses>, on_activity: ActivityCallback) -> Self {
        Self { chain, addresses, on_activity }
    }
}

fn parse_script(hex_script: &str) -> Result<ScriptBuf> {
    ScriptBuf::from_hex(hex_script).map_err(|e| Error::Decode(format!("script hex: {e}")))
}

#[async_trait]
impl ChainCallbacks for ChainBridge {
    async fn get_fees(&self) -> FeeEstimates { self.chain.get_fees().await }

    async fn get_best_block(&self) -> Result<Header> { self.chain.get_best_block().await }

    async fn get_address(&self) -> Result<String> {
        let next = self.addresses.next()?;
        let script = parse_script(&next.derived.script_pubkey)?;
        let report = self.chain.subscribe_addresses(&[script], self.on_activity.clone()).await;
        debug!(index = next.index, watched = report.subscribed.len(), "issued node address");
        Ok(next.derived.address)
    }

    async fn broadcast_transaction(&self, raw_tx_hex: &str) -> Result<String> {
        self.chain.broadcast_transaction(raw_tx_hex).await
    }

    async fn get_transaction_data(&self, txid: &str) -> TransactionData { self.chain.get_transaction_data(txid).await }

    async fn get_script_pubkey_history(&self, script_pubkey_hex: &str) -> Result<Vec<TxHistoryItem>> {
        let script = parse_script(script_pubkey_hex)?;
        self.chain.get_script_pubkey_history(&script).await
    }

    async fn get_transaction_position(&self, txid: &str, height: u32) -> i64 {
        self.chain.get_transaction_position(txid, height).await
    }
}
