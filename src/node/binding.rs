//! Seams to the embedded Lightning node.
//!
//! The node itself (channel manager, persistence, gossip) is an external
//! library. [`LightningNode`] is what the lifecycle drives; [`ChainCallbacks`]
//! is what the node calls back into for chain data.

use super::account::LightningAccount;
use super::config::UserConfig;
use crate::chain::{FeeEstimates, TransactionData, TxHistoryItem};
use crate::error::Result;
use crate::events::{EventSink, OpenChannelRequest};
use crate::payment::{decode_bolt11, DecodedInvoice};
use crate::types::{Channel, Header, Invoice, LightningPeer, Network};
use async_trait::async_trait;
use std::sync::Arc;

pub type NodeId = String;

#[async_trait]
pub trait ChainCallbacks: Send + Sync {
    async fn get_fees(&self) -> FeeEstimates;
    async fn get_best_block(&self) -> Result<Header>;
    /// Fresh receive address for channel closes and sweeps.
    async fn get_address(&self) -> Result<String>;
    async fn broadcast_transaction(&self, raw_tx_hex: &str) -> Result<String>;
    async fn get_transaction_data(&self, txid: &str) -> TransactionData;
    async fn get_script_pubkey_history(&self, script_pubkey_hex: &str) -> Result<Vec<TxHistoryItem>>;
    /// Merkle position, or -1 when unknown.
    async fn get_transaction_position(&self, txid: &str, height: u32) -> i64;
}

/// Everything the node needs to start.
pub struct StartParams {
    pub account: LightningAccount,
    pub network: Network,
    pub user_config: UserConfig,
    pub chain: Arc<dyn ChainCallbacks>,
    pub events: EventSink,
}

#[async_trait]
pub trait LightningNode: Send + Sync {
    async fn start(&self, params: StartParams) -> Result<NodeId>;
    /// Stop the node. Stopping an already stopped node is not an error.
    async fn stop(&self) -> Result<()>;
    /// Errors when the node is not running.
    async fn node_id(&self) -> Result<NodeId>;
    async fn sync_to_tip(&self, best_block: &Header) -> Result<()>;
    async fn list_channels(&self) -> Result<Vec<Channel>>;
    async fn claimable_balance_sat(&self) -> Result<u64>;
    async fn add_peer(&self, peer: &LightningPeer) -> Result<()>;

    async fn decode_invoice(&self, encoded: &str) -> Result<DecodedInvoice> {
        decode_bolt11(encoded)
    }

    async fn create_invoice(&self, amount_sat: Option<u64>, description: &str, expiry_secs: u32) -> Result<Invoice>;
    async fn accept_inbound_channel(&self, request: &OpenChannelRequest) -> Result<()>;
    async fn reject_inbound_channel(&self, request: &OpenChannelRequest) -> Result<()>;
}
