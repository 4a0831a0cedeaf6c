//! State - the application store the core writes into
//!
//! The real store lives in the host app; [`MemoryStore`] is a reactive
//! in-process implementation used by the CLI and tests.

mod memory;

pub use memory::{MemoryStore, StateChange};

use crate::error::Result;
use crate::types::{Channel, ChannelState, Header, Invoice, LightningPeer, Network, Payment};
use std::collections::HashMap;

pub trait StateStore: Send + Sync {
    fn header(&self) -> Option<Header>;
    fn set_header(&self, header: Header);

    fn channels(&self) -> Vec<Channel>;
    fn channel(&self, channel_id: &str) -> Option<Channel> {
        self.channels().into_iter().find(|c| c.channel_id == channel_id)
    }
    /// Apply a full channel-list refresh (see [`merge_channels`]).
    fn replace_channels(&self, refreshed: Vec<Channel>);

    fn claimable_balance_sat(&self) -> u64;
    fn set_claimable_balance_sat(&self, sat: u64);

    fn invoice(&self, payment_hash: &str) -> Option<Invoice>;
    fn invoices(&self) -> Vec<Invoice>;
    fn put_invoice(&self, invoice: Invoice);
    fn remove_invoice(&self, payment_hash: &str) -> bool;

    fn payment(&self, payment_hash: &str) -> Option<Payment>;
    fn payments(&self) -> Vec<Payment>;
    /// Returns `false` when a payment with the same hash already exists.
    fn record_payment(&self, payment: Payment) -> bool;
    fn set_payment_note(&self, payment_hash: &str, note: &str) -> Result<()>;

    fn custom_peers(&self, network: Network) -> Vec<LightningPeer>;
    /// Returns `false` when the peer was already known.
    fn add_custom_peer(&self, network: Network, peer: LightningPeer) -> bool;

    fn address_index(&self) -> Option<u32>;
    /// Implementations keep the maximum of the stored and the given index.
    fn set_address_index(&self, index: u32);
}

/// Merge a refreshed channel list into the previous one.
///
/// Channels the node reports closed, or no longer reports, are dropped.
/// A channel never moves backwards: a ready channel reported as pending stays ready.
pub fn merge_channels(previous: &[Channel], refreshed: Vec<Channel>) -> Vec<Channel> {
    let known: HashMap<&str, ChannelState> = previous.iter().map(|c| (c.channel_id.as_str(), c.state)).collect();
    refreshed
        .into_iter()
        .map(|mut c| {
            if let Some(prior) = known.get(c.channel_id.as_str()) {
                c.state = c.state.max(*prior);
            }
            c
        })
        .filter(|c| c.state != ChannelState::Closed)
        .collect()
}

/// Local balance we can spend: ready channels, minus reserves.
pub fn spendable_sat(channels: &[Channel]) -> u64 {
    channels.iter().filter(|c| c.is_ready()).map(Channel::spendable_sat).sum()
}

/// Remote balance we can still receive over ready channels.
pub fn receivable_sat(channels: &[Channel]) -> u64 {
    channels.iter().filter(|c| c.is_ready()).map(|c| c.inbound_sat).sum()
}
