//! Chain - connection to the chain-data backend and everything the node asks of it
//!
//! ```text
//!   ChainBackend (Electrum)
//!        │ headers / script status / tx data
//!        ▼
//!   ChainWatcher ── on_header ──▶ NodeLifecycle (sync wakeup)
//!        │      └─ on_activity ─▶ refresh callback per script hash
//!        └── TransactionData / merkle position / fees ──▶ node chain callbacks
//! ```

mod backend;
#[cfg(feature = "electrum")]
pub mod electrum;
pub mod fees;
pub mod peers;

pub use backend::{ChainBackend, MerklePosition, RawHeader, RawTransaction, TxHistoryItem, TxOutput};
#[cfg(feature = "electrum")]
pub use electrum::ElectrumBackend;
pub use fees::FeeEstimates;
pub use peers::default_electrum_peers;

use crate::error::{Error, Result};
use crate::runtime::Shutdown;
use crate::state::StateStore;
use crate::types::{ElectrumPeer, Header, Network};
use bitcoin::ScriptBuf;
use fees::FeeCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub type HeaderCallback = Arc<dyn Fn(&Header) + Send + Sync>;
pub type ActivityCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Electrum script hash: SHA256 of the script, byte-reversed, hex.
pub fn script_hash(script: &ScriptBuf) -> String {
    let mut digest = Sha256::digest(script.as_bytes()).to_vec();
    digest.reverse();
    hex::encode(digest)
}

/// Block hash (display order) of an 80-byte header given as hex.
pub fn block_hash(header_hex: &str) -> Result<String> {
    let bytes = hex::decode(header_hex).map_err(|e| Error::Decode(format!("header hex: {e}")))?;
    let header: bitcoin::block::Header = bitcoin::consensus::deserialize(&bytes)
        .map_err(|e| Error::Decode(format!("header: {e}")))?;
    Ok(header.block_hash().to_string())
}

/// What the node needs to confirm a transaction. Empty when anything is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionData {
    pub header: String,
    pub height: u32,
    pub transaction: String,
    pub outputs: Vec<TxOutput>,
}

impl TransactionData {
    pub fn empty() -> Self { Self::default() }
    pub fn is_empty(&self) -> bool { self.transaction.is_empty() }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionReport {
    pub subscribed: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Result of one notification pump.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub headers: Vec<Header>,
    pub active_scripts: Vec<String>,
}

struct Watch {
    script: ScriptBuf,
    on_activity: ActivityCallback,
}

pub struct ChainWatcher {
    backend: Arc<dyn ChainBackend>,
    network: Network,
    store: Option<Arc<dyn StateStore>>,
    header: RwLock<Option<Header>>,
    on_header: RwLock<Option<HeaderCallback>>,
    watches: Mutex<HashMap<String, Watch>>,
    fees: FeeCache,
}

impl ChainWatcher {
    pub fn new(backend: Arc<dyn ChainBackend>, network: Network) -> Self {
        Self {
            backend,
            network,
            store: None,
            header: RwLock::new(None),
            on_header: RwLock::new(None),
            watches: Mutex::new(HashMap::new()),
            fees: FeeCache::default(),
        }
    }

    /// Mirror every new header into `store`.
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn network(&self) -> Network { self.network }

    pub async fn is_connected(&self) -> bool { self.backend.connected_peer().await.is_some() }

    pub async fn connected_peer(&self) -> Option<ElectrumPeer> { self.backend.connected_peer().await }

    pub async fn peers(&self) -> Result<Vec<ElectrumPeer>> { self.backend.peers().await }

    /// Connect, retrying exactly once. Empty `peers` selects the network defaults.
    pub async fn connect(&self, peers: &[ElectrumPeer]) -> Result<ElectrumPeer> {
        let peers = if peers.is_empty() { default_electrum_peers(self.network) } else { peers.to_vec() };
        match self.backend.connect(&peers, self.network).await {
            Ok(peer) => Ok(peer),
            Err(first) => {
                warn!(error = %first, "chain connect failed, retrying once");
                self.backend.connect(&peers, self.network).await.map_err(|second| {
                    error!(error = %second, "chain connect retry failed");
                    Error::Connectivity(format!("retry failed: {second}"))
                })
            }
        }
    }

    /// Reconnect when the backend dropped its connection, then restore the
    /// header subscription and every script watch. Returns `true` if it reconnected.
    pub async fn ensure_connected(&self, peers: &[ElectrumPeer]) -> Result<bool> {
        if self.is_connected().await {
            return Ok(false);
        }
        let peer = self.connect(peers).await?;
        if self.on_header.read().unwrap_or_else(|p| p.into_inner()).is_some() {
            let tip = self.backend.subscribe_headers().await?;
            self.record_header(tip)?;
        }
        let scripts: Vec<(String, ScriptBuf)> = self
            .watches
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(hash, w)| (hash.clone(), w.script.clone()))
            .collect();
        for (hash, script) in &scripts {
            if let Err(e) = self.backend.subscribe_script(script).await {
                warn!(script_hash = %hash, error = %e, "script resubscribe failed");
            }
        }
        info!(host = %peer.host, watches = scripts.len(), "chain connection restored");
        Ok(true)
    }

    pub fn current_header(&self) -> Option<Header> {
        self.header.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn record_header(&self, raw: RawHeader) -> Result<Header> {
        let header = Header { height: raw.height, hash: block_hash(&raw.hex)?, hex: raw.hex };
        self.store_header(&header);
        Ok(header)
    }

    fn store_header(&self, header: &Header) {
        *self.header.write().unwrap_or_else(|p| p.into_inner()) = Some(header.clone());
        if let Some(store) = &self.store {
            store.set_header(header.clone());
        }
    }

    /// Ask the backend for the current tip and record it. Queued notifications
    /// are left for `poll`, so header callbacks still fire from there.
    pub async fn refresh_tip(&self) -> Result<Header> {
        let tip = self.backend.subscribe_headers().await?;
        self.record_header(tip)
    }

    /// Subscribe to new headers. The current tip is recorded and returned;
    /// `on_header` fires for every header that arrives afterwards.
    pub async fn subscribe_headers(&self, on_header: HeaderCallback) -> Result<Header> {
        *self.on_header.write().unwrap_or_else(|p| p.into_inner()) = Some(on_header);
        let tip = self.backend.subscribe_headers().await?;
        let header = self.record_header(tip)?;
        info!(height = header.height, "subscribed to headers");
        Ok(header)
    }

    /// Watch each script; `on_activity` receives the script hash when its status changes.
    pub async fn subscribe_addresses(&self, scripts: &[ScriptBuf], on_activity: ActivityCallback) -> SubscriptionReport {
        let mut report = SubscriptionReport::default();
        for script in scripts {
            let hash = script_hash(script);
            match self.backend.subscribe_script(script).await {
                Ok(_) => {
                    self.watches
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .insert(hash.clone(), Watch { script: script.clone(), on_activity: on_activity.clone() });
                    report.subscribed.push(hash);
                }
                Err(e) => {
                    warn!(script_hash = %hash, error = %e, "script subscription failed");
                    report.failed.push((hash, e.to_string()));
                }
            }
        }
        report
    }

    pub fn watched_count(&self) -> usize {
        self.watches.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Pump queued notifications once, in backend order.
    pub async fn poll(&self) -> Result<PollOutcome> {
        let mut outcome = PollOutcome::default();
        let callback = self.on_header.read().unwrap_or_else(|p| p.into_inner()).clone();
        for raw in self.backend.poll_headers().await? {
            let header = Header { height: raw.height, hash: block_hash(&raw.hex)?, hex: raw.hex };
            // A refreshed tip may already be ahead of queued notifications
            if self.current_header().map_or(true, |current| header.height >= current.height) {
                self.store_header(&header);
            }
            debug!(height = header.height, hash = %header.hash, "new block");
            if let Some(cb) = &callback {
                cb(&header);
            }
            outcome.headers.push(header);
        }

        let watched: Vec<(String, ScriptBuf, ActivityCallback)> = self
            .watches
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(hash, w)| (hash.clone(), w.script.clone(), w.on_activity.clone()))
            .collect();
        for (hash, script, on_activity) in watched {
            match self.backend.poll_script(&script).await {
                Ok(true) => {
                    debug!(script_hash = %hash, "script activity");
                    on_activity(&hash);
                    outcome.active_scripts.push(hash);
                }
                Ok(false) => {}
                Err(e) => warn!(script_hash = %hash, error = %e, "script poll failed"),
            }
        }
        Ok(outcome)
    }

    /// Poll every `interval` until `shutdown` fires.
    pub fn spawn_listener(self: Arc<Self>, interval: Duration, shutdown: &Shutdown) -> JoinHandle<()> {
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.recv() => {
                        debug!("chain listener stopped");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = self.poll().await {
                            warn!(error = %e, "chain poll failed");
                        }
                    }
                }
            }
        })
    }

    /// Current tip, fetched from the backend when nothing was recorded yet.
    pub async fn get_best_block(&self) -> Result<Header> {
        if let Some(header) = self.current_header() {
            return Ok(header);
        }
        let tip = self.backend.subscribe_headers().await?;
        self.record_header(tip)
    }

    pub async fn broadcast_transaction(&self, raw_tx_hex: &str) -> Result<String> {
        let txid = self.backend.broadcast(raw_tx_hex).await?;
        info!(%txid, "transaction broadcast");
        Ok(txid)
    }

    pub async fn get_transaction_data(&self, txid: &str) -> TransactionData {
        let current_height = match self.get_best_block().await {
            Ok(h) => h.height,
            Err(e) => {
                debug!(%txid, error = %e, "no tip for transaction data");
                return TransactionData::empty();
            }
        };
        let raw = match self.backend.get_transactions(&[txid.to_string()]).await {
            Ok(mut txs) if !txs.is_empty() => txs.remove(0),
            Ok(_) => return TransactionData::empty(),
            Err(e) => {
                debug!(%txid, error = %e, "transaction lookup failed");
                return TransactionData::empty();
            }
        };
        let (Some(hex), Some(confirmations), Some(outputs)) = (raw.hex, raw.confirmations, raw.outputs) else {
            return TransactionData::empty();
        };
        if confirmations == 0 || confirmations > current_height + 1 {
            return TransactionData::empty();
        }
        let height = current_height - confirmations + 1;
        match self.backend.get_header(height).await {
            Ok(header) => TransactionData { header: header.hex, height, transaction: hex, outputs },
            Err(e) => {
                debug!(%txid, height, error = %e, "header lookup failed");
                TransactionData::empty()
            }
        }
    }

    /// Position of `txid` in the block at `height`, or -1 when unknown.
    pub async fn get_transaction_position(&self, txid: &str, height: u32) -> i64 {
        match self.backend.transaction_merkle(txid, height).await {
            Ok(m) => i64::from(m.pos),
            Err(e) => {
                debug!(%txid, height, error = %e, "merkle lookup failed");
                -1
            }
        }
    }

    pub async fn get_script_pubkey_history(&self, script: &ScriptBuf) -> Result<Vec<TxHistoryItem>> {
        let mut history = self.backend.script_history(std::slice::from_ref(script)).await?;
        Ok(if history.is_empty() { Vec::new() } else { history.remove(0) })
    }

    pub async fn get_fees(&self) -> FeeEstimates { self.fees.refresh(self.backend.as_ref()).await }
}
