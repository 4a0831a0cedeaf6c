use crate::error::Result;
use crate::types::{ElectrumPeer, Network};
use async_trait::async_trait;
use bitcoin::ScriptBuf;
use serde::{Deserialize, Serialize};

/// Header as delivered by the backend: height plus 80-byte header hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    pub height: u32,
    pub hex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHistoryItem {
    pub txid: String,
    /// Confirmation height; 0 or negative while unconfirmed.
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerklePosition {
    pub block_height: u32,
    pub pos: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub n: u32,
    pub value_sat: u64,
    pub script_pubkey: String,
}

/// Verbose transaction as reported by the backend. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTransaction {
    pub txid: String,
    pub hex: Option<String>,
    pub confirmations: Option<u32>,
    pub outputs: Option<Vec<TxOutput>>,
}

impl RawTransaction {
    pub fn missing(txid: &str) -> Self { Self { txid: txid.to_string(), ..Default::default() } }
}

/// Chain-data backend (Electrum-style).
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Connect to the first reachable peer of `peers`.
    async fn connect(&self, peers: &[ElectrumPeer], network: Network) -> Result<ElectrumPeer>;
    async fn connected_peer(&self) -> Option<ElectrumPeer>;
    async fn peers(&self) -> Result<Vec<ElectrumPeer>>;

    async fn get_header(&self, height: u32) -> Result<RawHeader>;
    /// Subscribe to new headers; returns the current tip.
    async fn subscribe_headers(&self) -> Result<RawHeader>;
    /// Headers queued since the last poll, oldest first.
    async fn poll_headers(&self) -> Result<Vec<RawHeader>>;

    /// Subscribe to a script; returns its current status hash, if any history exists.
    async fn subscribe_script(&self, script: &ScriptBuf) -> Result<Option<String>>;
    /// Whether the script's status changed since the last poll.
    async fn poll_script(&self, script: &ScriptBuf) -> Result<bool>;
    async fn script_history(&self, scripts: &[ScriptBuf]) -> Result<Vec<Vec<TxHistoryItem>>>;

    async fn transaction_merkle(&self, txid: &str, height: u32) -> Result<MerklePosition>;
    async fn get_transactions(&self, txids: &[String]) -> Result<Vec<RawTransaction>>;
    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String>;
    /// Fee rate in BTC/kB for confirmation within `target_blocks`.
    async fn estimate_fee(&self, target_blocks: u32) -> Result<f64>;
}
