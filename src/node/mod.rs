//! Node - lifecycle of the embedded Lightning node
//!
//! ```text
//! NotStarted ──setup──▶ SettingUp ──▶ Running(Idle) ⇄ Running(Syncing)
//!      ▲                    │                │
//!      │                    ▼                ▼
//!      └──── reset ──── Error          Stopped (restart → setup)
//! ```
//!
//! One [`NodeLifecycle`] owns one logical node. Setup runs at most once per
//! start, and at most one keep-alive loop runs at a time.

pub mod account;
mod binding;
mod bridge;
pub mod config;

pub use account::LightningAccount;
pub use binding::{ChainCallbacks, LightningNode, NodeId, StartParams};
pub use bridge::ChainBridge;
pub use config::{default_lightning_peers, NodeConfig, UserConfig};

use crate::chain::{ActivityCallback, ChainWatcher, HeaderCallback};
use crate::error::{Error, Result};
use crate::events::{EventSink, SyncTrigger};
use crate::keys::{ReceiveAddresses, WalletSeed};
use crate::state::StateStore;
use crate::storage::{SecureStorage, VerifiedStorage};
use crate::types::{Invoice, LightningPeer};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify, OwnedRwLockReadGuard, RwLock as AsyncRwLock};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase { Idle, Syncing }

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    NotStarted,
    SettingUp,
    Running(RunPhase),
    Stopped,
    Error(String),
}

impl NodeState {
    pub fn is_running(&self) -> bool { matches!(self, NodeState::Running(_)) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub node_id: NodeId,
    pub height: u32,
    pub channels: usize,
    pub claimable_balance_sat: u64,
}

/// How a `keep_synced` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepSynced {
    /// Another loop was already active; nothing was started.
    AlreadyRunning,
    /// The loop ran until `stop_keep_synced`.
    Stopped,
}

/// Held by the UI while an interaction is in flight; syncs wait for it.
pub type InteractionGuard = OwnedRwLockReadGuard<()>;

/// Collaborators the lifecycle is built from.
pub struct LifecycleDeps {
    pub node: Arc<dyn LightningNode>,
    pub chain: Arc<ChainWatcher>,
    pub seed: Arc<WalletSeed>,
    pub storage: Arc<dyn SecureStorage>,
    pub store: Arc<dyn StateStore>,
    pub events: EventSink,
}

pub struct NodeLifecycle {
    config: NodeConfig,
    node: Arc<dyn LightningNode>,
    chain: Arc<ChainWatcher>,
    seed: Arc<WalletSeed>,
    storage: VerifiedStorage,
    store: Arc<dyn StateStore>,
    events: EventSink,
    addresses: Arc<ReceiveAddresses>,
    state: RwLock<NodeState>,
    node_id: RwLock<Option<NodeId>>,
    setup_lock: Mutex<()>,
    sync_lock: Mutex<()>,
    loop_active: AtomicBool,
    loop_stop: watch::Sender<u64>,
    sync_wanted: Arc<Notify>,
    interactions: Arc<AsyncRwLock<()>>,
}

impl NodeLifecycle {
    pub fn new(config: NodeConfig, deps: LifecycleDeps) -> Result<Self> {
        let addresses = ReceiveAddresses::resume(&deps.seed, config.address_type, config.network, deps.store.clone())?;
        let (loop_stop, _) = watch::channel(0);
        Ok(Self {
            config,
            node: deps.node,
            chain: deps.chain,
            seed: deps.seed,
            storage: VerifiedStorage::new(deps.storage),
            store: deps.store,
            events: deps.events,
            addresses: Arc::new(addresses),
            state: RwLock::new(NodeState::NotStarted),
            node_id: RwLock::new(None),
            setup_lock: Mutex::new(()),
            sync_lock: Mutex::new(()),
            loop_active: AtomicBool::new(false),
            loop_stop,
            sync_wanted: Arc::new(Notify::new()),
            interactions: Arc::new(AsyncRwLock::new(())),
        })
    }

    pub fn config(&self) -> &NodeConfig { &self.config }
    pub fn addresses(&self) -> &Arc<ReceiveAddresses> { &self.addresses }

    pub fn state(&self) -> NodeState { self.state.read().unwrap_or_else(|p| p.into_inner()).clone() }

    fn set_state(&self, next: NodeState) {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        if *state != next {
            debug!(from = ?*state, to = ?next, "node state");
            *state = next;
        }
    }

    pub fn node_id(&self) -> Option<NodeId> { self.node_id.read().unwrap_or_else(|p| p.into_inner()).clone() }

    fn set_node_id(&self, id: Option<NodeId>) { *self.node_id.write().unwrap_or_else(|p| p.into_inner()) = id; }

    pub fn is_keep_synced_active(&self) -> bool { self.loop_active.load(Ordering::SeqCst) }

    /// Wakes the keep-alive loop (or is remembered until it next waits).
    fn wake_callback(&self) -> Arc<Notify> { self.sync_wanted.clone() }

    /// Start the node once. Concurrent and repeated calls share the same start.
    pub async fn setup(&self) -> Result<NodeId> {
        let _setup = self.setup_lock.lock().await;
        match self.state() {
            NodeState::Running(_) => {
                if let Some(id) = self.node_id() {
                    debug!(node_id = %id, "node already running");
                    return Ok(id);
                }
            }
            NodeState::Error(reason) => {
                return Err(Error::InvalidState(format!("node failed ({reason}), reset required")));
            }
            _ => {}
        }

        self.set_state(NodeState::SettingUp);
        let id = match self.start_node().await {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "node setup failed");
                self.set_state(NodeState::Error(e.to_string()));
                return Err(match e {
                    Error::Setup(_) => e,
                    other => Error::Setup(other.to_string()),
                });
            }
        };
        self.set_node_id(Some(id.clone()));
        self.set_state(NodeState::Running(RunPhase::Idle));
        info!(node_id = %id, network = %self.config.network, "node running");

        if self.config.sync_on_start {
            if let Err(e) = self.sync_pass().await {
                warn!(error = %e, "initial sync failed");
            }
        }
        Ok(id)
    }

    async fn start_node(&self) -> Result<NodeId> {
        if let Err(e) = self.node.stop().await {
            debug!(error = %e, "no stale node to stop");
        }
        self.config.user_config.validate()?;
        let account = account::load_or_derive(&self.storage, &self.seed, self.config.network, &self.config.account_name)?;

        self.chain.ensure_connected(&self.config.electrum_peers).await?;
        let wake = self.wake_callback();
        let on_header: HeaderCallback = Arc::new(move |header| {
            debug!(height = header.height, "new tip, waking sync");
            wake.notify_one();
        });
        self.chain.subscribe_headers(on_header).await?;

        let wake = self.wake_callback();
        let on_activity: ActivityCallback = Arc::new(move |script_hash| {
            debug!(%script_hash, "address activity, waking sync");
            wake.notify_one();
        });
        let params = StartParams {
            account,
            network: self.config.network,
            user_config: self.config.user_config.clone(),
            chain: Arc::new(ChainBridge::new(self.chain.clone(), self.addresses.clone(), on_activity)),
            events: self.events.clone(),
        };
        let id = self.node.start(params).await?;

        for peer in self.peers_to_connect() {
            if let Err(e) = self.connect_peer(&peer).await {
                warn!(%peer, error = %e, "peer reconnect failed");
            }
        }
        Ok(id)
    }

    fn peers_to_connect(&self) -> Vec<LightningPeer> {
        let mut peers = self.config.lightning_peers.clone();
        for peer in self.store.custom_peers(self.config.network) {
            if !peers.contains(&peer) {
                peers.push(peer);
            }
        }
        peers
    }

    async fn connect_peer(&self, peer: &LightningPeer) -> Result<()> {
        match tokio::time::timeout(self.config.peer_timeout, self.node.add_peer(peer)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!("connecting to {peer}"))),
        }
    }

    /// Connect a peer through the running node, bounded by the peer timeout.
    pub async fn add_peer(&self, peer: &LightningPeer) -> Result<()> {
        if !self.state().is_running() {
            return Err(Error::InvalidState("node is not running".into()));
        }
        self.connect_peer(peer).await
    }

    /// Take the interaction gate; syncs wait until every guard is dropped.
    pub async fn begin_interaction(&self) -> InteractionGuard { self.interactions.clone().read_owned().await }

    async fn settle_interactions(&self) {
        drop(self.interactions.write().await);
    }

    async fn is_alive(&self) -> bool {
        if !self.state().is_running() {
            return false;
        }
        match tokio::time::timeout(self.config.liveness_timeout, self.node.node_id()).await {
            Ok(Ok(id)) => self.node_id().as_deref() == Some(id.as_str()),
            Ok(Err(e)) => {
                debug!(error = %e, "liveness probe failed");
                false
            }
            Err(_) => {
                warn!("liveness probe timed out");
                false
            }
        }
    }

    /// Bring the node to the chain tip and refresh channels and balances.
    pub async fn sync(&self) -> Result<SyncSummary> {
        self.settle_interactions().await;
        if !self.is_alive().await {
            info!(state = ?self.state(), "node not running, restarting before sync");
            self.reset_node().await;
            self.setup().await?;
        }
        self.sync_pass().await
    }

    async fn sync_pass(&self) -> Result<SyncSummary> {
        let _sync = self.sync_lock.lock().await;
        let node_id = self.node_id().ok_or_else(|| Error::InvalidState("node has no id".into()))?;
        self.set_state(NodeState::Running(RunPhase::Syncing));

        let result = async {
            self.chain.ensure_connected(&self.config.electrum_peers).await?;
            let tip = match self.chain.refresh_tip().await {
                Ok(tip) => tip,
                Err(e) => {
                    warn!(error = %e, "tip refresh failed, using last known tip");
                    self.chain.get_best_block().await?
                }
            };
            self.node.sync_to_tip(&tip).await?;
            let channels = self.node.list_channels().await?;
            let channel_count = channels.len();
            self.store.replace_channels(channels);
            let claimable_balance_sat = self.node.claimable_balance_sat().await?;
            self.store.set_claimable_balance_sat(claimable_balance_sat);
            Ok(SyncSummary { node_id, height: tip.height, channels: channel_count, claimable_balance_sat })
        }
        .await;

        if self.state() == NodeState::Running(RunPhase::Syncing) {
            self.set_state(NodeState::Running(RunPhase::Idle));
        }
        match &result {
            Ok(summary) => debug!(height = summary.height, channels = summary.channels, "sync complete"),
            Err(e) => warn!(error = %e, "sync failed"),
        }
        result
    }

    /// Sync every `frequency` (or sooner on a new block) until stopped.
    /// Only one loop runs at a time; a second call returns at once.
    pub async fn keep_synced(&self, frequency: Duration) -> Result<KeepSynced> {
        let mut stop = self.loop_stop.subscribe();
        if self.loop_active.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            debug!("keep-alive loop already active");
            return Ok(KeepSynced::AlreadyRunning);
        }
        if !self.state().is_running() {
            self.loop_active.store(false, Ordering::SeqCst);
            return Err(Error::InvalidState("keep_synced requires a running node".into()));
        }
        info!(frequency_ms = frequency.as_millis() as u64, "keep-alive loop started");

        let outcome = loop {
            if let Err(e) = self.sync().await {
                error!(error = %e, "keep-alive sync failed, stopping loop");
                break Err(e);
            }
            tokio::select! {
                _ = tokio::time::sleep(frequency) => {}
                _ = self.sync_wanted.notified() => debug!("sync requested"),
                _ = stop.changed() => break Ok(KeepSynced::Stopped),
            }
        };
        self.loop_active.store(false, Ordering::SeqCst);
        info!("keep-alive loop ended");
        outcome
    }

    pub fn stop_keep_synced(&self) {
        self.loop_stop.send_modify(|generation| *generation += 1);
    }

    /// Stop the loop and the node.
    pub async fn stop(&self) -> Result<()> {
        self.stop_keep_synced();
        let result = self.node.stop().await;
        self.set_node_id(None);
        self.set_state(NodeState::Stopped);
        result
    }

    /// Stop everything, then start again.
    pub async fn restart(&self) -> Result<NodeId> {
        if let NodeState::Error(reason) = self.state() {
            return Err(Error::InvalidState(format!("node failed ({reason}), reset required")));
        }
        if let Err(e) = self.stop().await {
            warn!(error = %e, "stop before restart failed");
        }
        self.setup().await
    }

    /// Stop the loop and the node, ignoring errors, and return to `NotStarted`.
    pub async fn reset(&self) {
        self.stop_keep_synced();
        self.reset_node().await;
    }

    async fn reset_node(&self) {
        if let Err(e) = self.node.stop().await {
            debug!(error = %e, "stop during reset failed");
        }
        self.set_node_id(None);
        self.set_state(NodeState::NotStarted);
    }

    /// Ask the node for an invoice and keep it as pending.
    pub async fn create_invoice(&self, amount_sat: Option<u64>, description: &str, expiry_secs: u32) -> Result<Invoice> {
        if !self.state().is_running() {
            return Err(Error::InvalidState("node is not running".into()));
        }
        let invoice = self.node.create_invoice(amount_sat, description, expiry_secs).await?;
        self.store.put_invoice(invoice.clone());
        info!(payment_hash = %invoice.payment_hash, amount_sat = ?amount_sat, "invoice created");
        Ok(invoice)
    }

    /// Drop unpaid invoices that expired at `now_secs`. Returns how many.
    pub fn sweep_expired_invoices(&self, now_secs: u64) -> usize {
        let mut swept = 0;
        for invoice in self.store.invoices() {
            if invoice.is_expired(now_secs)
                && self.store.payment(&invoice.payment_hash).is_none()
                && self.store.remove_invoice(&invoice.payment_hash)
            {
                swept += 1;
            }
        }
        if swept > 0 {
            debug!(swept, "expired invoices removed");
        }
        swept
    }
}

#[async_trait]
impl SyncTrigger for NodeLifecycle {
    async fn trigger_sync(&self) {
        if self.is_keep_synced_active() {
            self.sync_wanted.notify_one();
            return;
        }
        if let Err(e) = self.sync().await {
            warn!(error = %e, "requested sync failed");
        }
    }
}
