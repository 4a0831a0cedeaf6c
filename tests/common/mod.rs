//! Shared fakes for the integration tests: a scripted chain backend, an
//! in-memory Lightning node and an LNURL service that records requests.

#![allow(dead_code)]

use async_trait::async_trait;
use bitcoin::ScriptBuf;
use lightkeeper::chain::{
    script_hash, ChainBackend, ChainWatcher, MerklePosition, RawHeader, RawTransaction, TxHistoryItem,
};
use lightkeeper::events::{self, EventStream, OpenChannelRequest, SyncTrigger};
use lightkeeper::node::{ChainCallbacks, LifecycleDeps, LightningNode, NodeId, StartParams};
use lightkeeper::payment::{decode_bolt11, DecodedInvoice, LnurlHttp};
use lightkeeper::storage::MemoryKeychain;
use lightkeeper::types::{now_secs, Channel, ChannelState, ElectrumPeer, Header, Invoice, LightningPeer, Network};
use lightkeeper::{Error, MemoryStore, NodeConfig, NodeLifecycle, Result, WalletSeed};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Well-known test mnemonic, never use with real funds
pub const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub const NODE_ID: &str = "0211111111111111111111111111111111111111111111111111111111111111";
pub const PEER_PUBKEY: &str = "03864ef025fde8fb587d989186ce6a4a186895ee44a926bfc370e2c366597a3f8f";

/// 80 zero-ish bytes; any 80 bytes deserialize as a header.
pub fn header_hex(height: u32) -> String {
    format!("{}{:08x}", "00".repeat(76), height)
}

/// A real signed bolt11 invoice created now, paying `amount_msat`.
pub fn signed_invoice(currency: lightning_invoice::Currency, amount_msat: u64) -> String {
    use bitcoin::hashes::{sha256, Hash};
    use bitcoin::secp256k1::{Secp256k1, SecretKey};
    use lightning_invoice::{InvoiceBuilder, PaymentSecret};

    let secp = Secp256k1::new();
    let key = SecretKey::from_slice(&[0x42; 32]).unwrap();
    InvoiceBuilder::new(currency)
        .description("coffee".into())
        .payment_hash(sha256::Hash::from_slice(&[0x07; 32]).unwrap())
        .payment_secret(PaymentSecret([0x08; 32]))
        .amount_milli_satoshis(amount_msat)
        .duration_since_epoch(Duration::from_secs(now_secs()))
        .expiry_time(Duration::from_secs(3_600))
        .min_final_cltv_expiry_delta(144)
        .build_signed(|msg| secp.sign_ecdsa_recoverable(msg, &key))
        .unwrap()
        .to_string()
}

pub fn raw_header(height: u32) -> RawHeader {
    RawHeader { height, hex: header_hex(height) }
}

pub fn ready_channel(id: &str, balance_sat: u64, inbound_sat: u64) -> Channel {
    Channel {
        channel_id: id.to_string(),
        counterparty_node_id: PEER_PUBKEY.to_string(),
        balance_sat,
        inbound_sat,
        reserve_sat: 0,
        state: ChannelState::Ready,
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

// =============================================================================
// Chain backend
// =============================================================================

#[derive(Default)]
pub struct MockBackend {
    /// Scripted connect outcomes; `Ok` once exhausted.
    pub connect_script: Mutex<VecDeque<std::result::Result<(), String>>>,
    pub connect_calls: AtomicUsize,
    pub connect_peers: Mutex<Vec<Vec<ElectrumPeer>>>,
    connected: Mutex<Option<ElectrumPeer>>,
    pub tip: Mutex<u32>,
    pub queued_headers: Mutex<Vec<RawHeader>>,
    pub subscribed_scripts: Mutex<Vec<String>>,
    pub failing_scripts: Mutex<HashSet<String>>,
    pub active_scripts: Mutex<HashSet<String>>,
    pub history: Mutex<HashMap<String, Vec<TxHistoryItem>>>,
    pub transactions: Mutex<HashMap<String, RawTransaction>>,
    pub merkle: Mutex<HashMap<String, u32>>,
    pub fee_rate: Mutex<Option<f64>>,
    pub broadcasts: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new(tip: u32) -> Arc<Self> {
        let backend = Self::default();
        *lock(&backend.tip) = tip;
        Arc::new(backend)
    }

    pub fn fail_connects(&self, times: usize) {
        let mut script = lock(&self.connect_script);
        for i in 0..times {
            script.push_back(Err(format!("peer unreachable ({})", i + 1)));
        }
    }

    /// Queue a new block for the next poll and advance the tip.
    pub fn mine(&self, height: u32) {
        *lock(&self.tip) = height;
        lock(&self.queued_headers).push(raw_header(height));
    }

    pub fn touch(&self, script: &ScriptBuf) {
        lock(&self.active_scripts).insert(script_hash(script));
    }

    pub fn add_transaction(&self, tx: RawTransaction) {
        lock(&self.transactions).insert(tx.txid.clone(), tx);
    }

    pub fn drop_connection(&self) {
        *lock(&self.connected) = None;
    }
}

#[async_trait]
impl ChainBackend for MockBackend {
    async fn connect(&self, peers: &[ElectrumPeer], _network: Network) -> Result<ElectrumPeer> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.connect_peers).push(peers.to_vec());
        if let Some(Err(reason)) = lock(&self.connect_script).pop_front() {
            return Err(Error::Connectivity(reason));
        }
        let peer = peers.first().cloned().ok_or_else(|| Error::Connectivity("no peers".into()))?;
        *lock(&self.connected) = Some(peer.clone());
        Ok(peer)
    }

    async fn connected_peer(&self) -> Option<ElectrumPeer> { lock(&self.connected).clone() }

    async fn peers(&self) -> Result<Vec<ElectrumPeer>> { Ok(lock(&self.connected).iter().cloned().collect()) }

    async fn get_header(&self, height: u32) -> Result<RawHeader> {
        if height > *lock(&self.tip) {
            return Err(Error::Chain(format!("no header at {height}")));
        }
        Ok(raw_header(height))
    }

    async fn subscribe_headers(&self) -> Result<RawHeader> { Ok(raw_header(*lock(&self.tip))) }

    async fn poll_headers(&self) -> Result<Vec<RawHeader>> { Ok(std::mem::take(&mut *lock(&self.queued_headers))) }

    async fn subscribe_script(&self, script: &ScriptBuf) -> Result<Option<String>> {
        let hash = script_hash(script);
        if lock(&self.failing_scripts).contains(&hash) {
            return Err(Error::Chain("subscription refused".into()));
        }
        lock(&self.subscribed_scripts).push(hash);
        Ok(None)
    }

    async fn poll_script(&self, script: &ScriptBuf) -> Result<bool> {
        Ok(lock(&self.active_scripts).remove(&script_hash(script)))
    }

    async fn script_history(&self, scripts: &[ScriptBuf]) -> Result<Vec<Vec<TxHistoryItem>>> {
        let history = lock(&self.history);
        Ok(scripts.iter().map(|s| history.get(&script_hash(s)).cloned().unwrap_or_default()).collect())
    }

    async fn transaction_merkle(&self, txid: &str, height: u32) -> Result<MerklePosition> {
        lock(&self.merkle)
            .get(txid)
            .map(|pos| MerklePosition { block_height: height, pos: *pos })
            .ok_or_else(|| Error::Chain(format!("no merkle proof for {txid}")))
    }

    async fn get_transactions(&self, txids: &[String]) -> Result<Vec<RawTransaction>> {
        let txs = lock(&self.transactions);
        Ok(txids.iter().map(|id| txs.get(id).cloned().unwrap_or_else(|| RawTransaction::missing(id))).collect())
    }

    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String> {
        lock(&self.broadcasts).push(raw_tx_hex.to_string());
        Ok(format!("txid-{}", lock(&self.broadcasts).len()))
    }

    async fn estimate_fee(&self, _target_blocks: u32) -> Result<f64> {
        lock(&self.fee_rate).ok_or_else(|| Error::Chain("no estimate".into()))
    }
}

// =============================================================================
// Lightning node
// =============================================================================

#[derive(Default)]
pub struct MockNode {
    running: Mutex<Option<NodeId>>,
    pub fail_start: AtomicBool,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub sync_calls: AtomicUsize,
    pub channels: Mutex<Vec<Channel>>,
    pub balance_sat: AtomicU64,
    pub add_peer_delay: Mutex<Duration>,
    pub added_peers: Mutex<Vec<LightningPeer>>,
    pub decoded: Mutex<HashMap<String, DecodedInvoice>>,
    pub invoices_created: AtomicUsize,
    pub accepted: Mutex<Vec<String>>,
    pub rejected: Mutex<Vec<String>>,
    pub synced_heights: Mutex<Vec<u32>>,
    chain: Mutex<Option<Arc<dyn ChainCallbacks>>>,
}

impl MockNode {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn is_running(&self) -> bool { lock(&self.running).is_some() }

    /// Simulate the node dying underneath the lifecycle.
    pub fn crash(&self) { *lock(&self.running) = None; }

    pub fn set_channels(&self, channels: Vec<Channel>) { *lock(&self.channels) = channels; }

    pub fn chain(&self) -> Arc<dyn ChainCallbacks> {
        lock(&self.chain).clone().expect("node started")
    }

    /// Make `encoded` decode to an invoice for `amount_msat` on `network`.
    pub fn register_invoice(&self, encoded: &str, amount_msat: Option<u64>, network: Network) -> DecodedInvoice {
        let decoded = DecodedInvoice {
            encoded: encoded.to_string(),
            payment_hash: format!("{:064x}", lock(&self.decoded).len() + 1),
            amount_msat,
            description: Some("coffee".into()),
            payee: Some(PEER_PUBKEY.into()),
            timestamp: now_secs(),
            expiry_secs: 3_600,
            network: Some(network),
        };
        lock(&self.decoded).insert(encoded.to_string(), decoded.clone());
        decoded
    }
}

#[async_trait]
impl LightningNode for MockNode {
    async fn start(&self, params: StartParams) -> Result<NodeId> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::Node("channel monitor corrupted".into()));
        }
        assert_eq!(params.account.seed.len(), 64);
        *lock(&self.chain) = Some(params.chain);
        *lock(&self.running) = Some(NODE_ID.to_string());
        Ok(NODE_ID.to_string())
    }

    async fn stop(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.running) = None;
        Ok(())
    }

    async fn node_id(&self) -> Result<NodeId> {
        lock(&self.running).clone().ok_or_else(|| Error::Node("not running".into()))
    }

    async fn sync_to_tip(&self, best_block: &Header) -> Result<()> {
        if !self.is_running() {
            return Err(Error::Node("not running".into()));
        }
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.synced_heights).push(best_block.height);
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<Channel>> { Ok(lock(&self.channels).clone()) }

    async fn claimable_balance_sat(&self) -> Result<u64> { Ok(self.balance_sat.load(Ordering::SeqCst)) }

    async fn add_peer(&self, peer: &LightningPeer) -> Result<()> {
        let delay = *lock(&self.add_peer_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        lock(&self.added_peers).push(peer.clone());
        Ok(())
    }

    /// Registered invoices first, real bolt11 decoding otherwise.
    async fn decode_invoice(&self, encoded: &str) -> Result<DecodedInvoice> {
        if let Some(decoded) = lock(&self.decoded).get(encoded).cloned() {
            return Ok(decoded);
        }
        decode_bolt11(encoded)
    }

    async fn create_invoice(&self, amount_sat: Option<u64>, description: &str, expiry_secs: u32) -> Result<Invoice> {
        let n = self.invoices_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Invoice {
            payment_hash: format!("{n:064x}"),
            amount_sat,
            description: description.to_string(),
            expires_at: now_secs() + u64::from(expiry_secs),
            encoded: format!("lnbcrt{n}n1pmock"),
        })
    }

    async fn accept_inbound_channel(&self, request: &OpenChannelRequest) -> Result<()> {
        lock(&self.accepted).push(request.temporary_channel_id.clone());
        Ok(())
    }

    async fn reject_inbound_channel(&self, request: &OpenChannelRequest) -> Result<()> {
        lock(&self.rejected).push(request.temporary_channel_id.clone());
        Ok(())
    }
}

// =============================================================================
// LNURL service and sync trigger
// =============================================================================

#[derive(Default)]
pub struct MockLnurl {
    pub responses: Mutex<VecDeque<Value>>,
    pub requests: Mutex<Vec<String>>,
}

impl MockLnurl {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn respond(&self, body: Value) { lock(&self.responses).push_back(body); }

    pub fn requests(&self) -> Vec<String> { lock(&self.requests).clone() }
}

#[async_trait]
impl LnurlHttp for MockLnurl {
    async fn get_json(&self, url: &str) -> Result<Value> {
        lock(&self.requests).push(url.to_string());
        lock(&self.responses).pop_front().ok_or_else(|| Error::Connectivity(format!("no route to {url}")))
    }
}

#[derive(Default)]
pub struct CountingSync {
    pub calls: AtomicUsize,
}

#[async_trait]
impl SyncTrigger for CountingSync {
    async fn trigger_sync(&self) { self.calls.fetch_add(1, Ordering::SeqCst); }
}

// =============================================================================
// Lifecycle harness
// =============================================================================

pub struct Harness {
    pub lifecycle: Arc<NodeLifecycle>,
    pub node: Arc<MockNode>,
    pub backend: Arc<MockBackend>,
    pub chain: Arc<ChainWatcher>,
    pub store: Arc<MemoryStore>,
    pub keychain: Arc<MemoryKeychain>,
    pub events: Option<EventStream>,
}

pub fn test_config() -> NodeConfig {
    NodeConfig::regtest()
        .with_electrum_peers(vec![ElectrumPeer::tcp("127.0.0.1", 60401)])
        .with_peer_timeout(Duration::from_millis(200))
        .with_liveness_timeout(Duration::from_millis(200))
}

pub fn harness() -> Harness { harness_with(test_config()) }

pub fn harness_with(config: NodeConfig) -> Harness {
    let node = MockNode::new();
    let backend = MockBackend::new(100);
    let store = Arc::new(MemoryStore::new());
    let keychain = Arc::new(MemoryKeychain::new());
    let chain = Arc::new(ChainWatcher::new(backend.clone(), config.network).with_store(store.clone()));
    let (sink, stream) = events::channel();
    let seed = WalletSeed::from_mnemonic(TEST_MNEMONIC, "").expect("seed");
    let deps = LifecycleDeps {
        node: node.clone(),
        chain: chain.clone(),
        seed: Arc::new(seed),
        storage: keychain.clone(),
        store: store.clone(),
        events: sink,
    };
    let lifecycle = Arc::new(NodeLifecycle::new(config, deps).expect("lifecycle"));
    Harness { lifecycle, node, backend, chain, store, keychain, events: Some(stream) }
}
