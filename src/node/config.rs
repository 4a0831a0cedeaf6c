//! Node Configuration - passed from higher layers

use crate::error::{Error, Result};
use crate::keys::AddressType;
use crate::types::{ElectrumPeer, LightningPeer, Network};
use std::time::Duration;

/// Channel handshake and acceptance settings handed to the node at start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserConfig {
    pub announced_channels: bool,
    /// 0..=100
    pub max_htlc_value_in_flight_percent_of_channel: u8,
    /// 0 enables zero-conf channels.
    pub minimum_depth: u32,
    pub manually_accept_inbound_channels: bool,
    pub accept_inbound_channels: bool,
    pub accept_intercept_htlcs: bool,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            announced_channels: false,
            max_htlc_value_in_flight_percent_of_channel: 100,
            minimum_depth: 0,
            manually_accept_inbound_channels: true,
            accept_inbound_channels: true,
            accept_intercept_htlcs: false,
        }
    }
}

impl UserConfig {
    pub fn with_minimum_depth(mut self, depth: u32) -> Self { self.minimum_depth = depth; self }
    pub fn with_max_htlc_percent(mut self, percent: u8) -> Self { self.max_htlc_value_in_flight_percent_of_channel = percent; self }
    pub fn announced(mut self) -> Self { self.announced_channels = true; self }

    pub fn validate(&self) -> Result<()> {
        if self.max_htlc_value_in_flight_percent_of_channel > 100 {
            return Err(Error::Setup(format!(
                "max_htlc_value_in_flight_percent_of_channel {} exceeds 100",
                self.max_htlc_value_in_flight_percent_of_channel
            )));
        }
        if self.manually_accept_inbound_channels && !self.accept_inbound_channels {
            return Err(Error::Setup("manual acceptance requires accept_inbound_channels".into()));
        }
        Ok(())
    }
}

/// Default Lightning peers the node reconnects to on every start.
pub fn default_lightning_peers(network: Network) -> Vec<LightningPeer> {
    match network {
        Network::Bitcoin => vec![LightningPeer::new(
            "03864ef025fde8fb587d989186ce6a4a186895ee44a926bfc370e2c366597a3f8f",
            "3.33.236.230",
            9735,
        )],
        Network::Testnet => vec![LightningPeer::new(
            "03933884aaf1d6b108397e5efe5c86bcf2d8ca8d2f700eda99db9214fc2712b134",
            "34.250.234.192",
            9735,
        )],
        Network::Signet | Network::Regtest => Vec::new(),
    }
}

/// Lifecycle configuration. Higher layers construct this.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub network: Network,
    pub account_name: String,
    pub address_type: AddressType,
    pub user_config: UserConfig,
    /// Empty selects the network's hardcoded servers.
    pub electrum_peers: Vec<ElectrumPeer>,
    pub lightning_peers: Vec<LightningPeer>,
    pub sync_frequency: Duration,
    pub peer_timeout: Duration,
    pub liveness_timeout: Duration,
    pub sync_on_start: bool,
}

impl NodeConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            account_name: "wallet0".into(),
            address_type: AddressType::default(),
            user_config: UserConfig::default(),
            electrum_peers: Vec::new(),
            lightning_peers: default_lightning_peers(network),
            sync_frequency: Duration::from_secs(60),
            peer_timeout: Duration::from_secs(10),
            liveness_timeout: Duration::from_secs(5),
            sync_on_start: true,
        }
    }
    pub fn mainnet() -> Self { Self::new(Network::Bitcoin) }
    pub fn regtest() -> Self { Self::new(Network::Regtest) }
    pub fn with_account_name(mut self, name: impl Into<String>) -> Self { self.account_name = name.into(); self }
    pub fn with_address_type(mut self, t: AddressType) -> Self { self.address_type = t; self }
    pub fn with_user_config(mut self, c: UserConfig) -> Self { self.user_config = c; self }
    pub fn with_electrum_peers(mut self, peers: Vec<ElectrumPeer>) -> Self { self.electrum_peers = peers; self }
    pub fn with_lightning_peers(mut self, peers: Vec<LightningPeer>) -> Self { self.lightning_peers = peers; self }
    pub fn with_sync_frequency(mut self, d: Duration) -> Self { self.sync_frequency = d; self }
    pub fn with_peer_timeout(mut self, d: Duration) -> Self { self.peer_timeout = d; self }
    pub fn with_liveness_timeout(mut self, d: Duration) -> Self { self.liveness_timeout = d; self }
    pub fn with_sync_on_start(mut self, enabled: bool) -> Self { self.sync_on_start = enabled; self }
}
