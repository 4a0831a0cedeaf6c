//! Shared types - network, chain headers, channels, invoices, payments, peers

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network { #[default] Bitcoin, Testnet, Signet, Regtest }

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self { Network::Bitcoin => "bitcoin", Network::Testnet => "testnet", Network::Signet => "signet", Network::Regtest => "regtest" }
    }
    pub fn to_bitcoin(&self) -> bitcoin::Network {
        match self { Network::Bitcoin => bitcoin::Network::Bitcoin, Network::Testnet => bitcoin::Network::Testnet, Network::Signet => bitcoin::Network::Signet, Network::Regtest => bitcoin::Network::Regtest }
    }
    /// BIP44 coin type: 0 on mainnet, 1 for every test network.
    pub fn coin_type(&self) -> u32 {
        if *self == Network::Bitcoin { 0 } else { 1 }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Network {
    type Err = Error;
    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bitcoin" | "mainnet" | "main" => Ok(Network::Bitcoin),
            "testnet" | "test" => Ok(Network::Testnet),
            "signet" => Ok(Network::Signet),
            "regtest" => Ok(Network::Regtest),
            other => Err(Error::Unsupported(format!("network '{other}'"))),
        }
    }
}

/// Current chain tip as last reported by the chain backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub height: u32,
    pub hash: String,
    pub hex: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectrumProtocol { Ssl, Tcp }

/// Electrum server endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectrumPeer {
    pub host: String,
    pub ssl: Option<u16>,
    pub tcp: Option<u16>,
    pub protocol: ElectrumProtocol,
}

impl ElectrumPeer {
    pub fn ssl(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), ssl: Some(port), tcp: None, protocol: ElectrumProtocol::Ssl }
    }
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), ssl: None, tcp: Some(port), protocol: ElectrumProtocol::Tcp }
    }

    /// Connection URL for the selected protocol, e.g. `ssl://host:50002`.
    pub fn url(&self) -> Result<String> {
        let (scheme, port) = match self.protocol {
            ElectrumProtocol::Ssl => ("ssl", self.ssl),
            ElectrumProtocol::Tcp => ("tcp", self.tcp),
        };
        let port = port.ok_or_else(|| Error::Connectivity(format!("{} has no {} port", self.host, scheme)))?;
        Ok(format!("{scheme}://{}:{port}", self.host))
    }

    /// Parse `ssl://host:port`, `tcp://host:port` or bare `host:port` (ssl).
    pub fn parse(value: &str) -> Result<Self> {
        let (protocol, rest) = match value.split_once("://") {
            Some(("ssl", rest)) => (ElectrumProtocol::Ssl, rest),
            Some(("tcp", rest)) => (ElectrumProtocol::Tcp, rest),
            Some((scheme, _)) => return Err(Error::Unsupported(format!("electrum scheme '{scheme}'"))),
            None => (ElectrumProtocol::Ssl, value),
        };
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| Error::Decode(format!("electrum peer '{value}' has no port")))?;
        let port: u16 = port.parse().map_err(|_| Error::Decode(format!("electrum port '{port}'")))?;
        Ok(match protocol {
            ElectrumProtocol::Ssl => Self::ssl(host, port),
            ElectrumProtocol::Tcp => Self::tcp(host, port),
        })
    }
}

/// Lifecycle of a channel. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState { Pending, Ready, Closed }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: String,
    pub counterparty_node_id: String,
    /// Local balance in sats.
    pub balance_sat: u64,
    /// Remote balance in sats (what we can still receive).
    pub inbound_sat: u64,
    /// Punishment reserve we cannot spend.
    pub reserve_sat: u64,
    pub state: ChannelState,
}

impl Channel {
    pub fn is_ready(&self) -> bool { self.state == ChannelState::Ready }
    pub fn spendable_sat(&self) -> u64 { self.balance_sat.saturating_sub(self.reserve_sat) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub payment_hash: String,
    pub amount_sat: Option<u64>,
    pub description: String,
    /// Unix seconds after which the invoice can no longer be paid.
    pub expires_at: u64,
    pub encoded: String,
}

impl Invoice {
    pub fn is_expired(&self, now_secs: u64) -> bool { now_secs >= self.expires_at }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentDirection { Sent, Received }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_hash: String,
    pub amount_sat: u64,
    pub direction: PaymentDirection,
    pub note: String,
    pub timestamp: u64,
}

impl Payment {
    pub fn received(invoice: &Invoice, amount_sat: u64, timestamp: u64) -> Self {
        Self {
            payment_hash: invoice.payment_hash.clone(),
            amount_sat,
            direction: PaymentDirection::Received,
            note: invoice.description.clone(),
            timestamp,
        }
    }

    pub fn sent(payment_hash: &str, amount_sat: u64, timestamp: u64) -> Self {
        Self {
            payment_hash: payment_hash.to_string(),
            amount_sat,
            direction: PaymentDirection::Sent,
            note: String::new(),
            timestamp,
        }
    }
}

/// Lightning peer, written `pubkey@host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LightningPeer {
    pub pubkey: String,
    pub address: String,
    pub port: u16,
}

impl LightningPeer {
    pub fn new(pubkey: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self { pubkey: pubkey.into(), address: address.into(), port }
    }
    pub fn is_onion(&self) -> bool { self.address.to_ascii_lowercase().ends_with(".onion") }
}

impl fmt::Display for LightningPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.pubkey, self.address, self.port)
    }
}

impl FromStr for LightningPeer {
    type Err = Error;
    fn from_str(value: &str) -> Result<Self> {
        let (pubkey, rest) = value
            .trim()
            .split_once('@')
            .ok_or_else(|| Error::Decode(format!("node uri '{value}' is missing '@'")))?;
        if pubkey.len() != 66 || !pubkey.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Decode(format!("node pubkey '{pubkey}' must be 33 bytes hex")));
        }
        let (address, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| Error::Decode(format!("node uri '{value}' is missing a port")))?;
        let port: u16 = port.parse().map_err(|_| Error::Decode(format!("node port '{port}'")))?;
        if address.is_empty() {
            return Err(Error::Decode(format!("node uri '{value}' has no host")));
        }
        Ok(Self::new(pubkey.to_ascii_lowercase(), address.trim_matches(|c| c == '[' || c == ']'), port))
    }
}

/// Current unix time in seconds.
pub fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
