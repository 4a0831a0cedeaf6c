use super::{merge_channels, StateStore};
use crate::error::{Error, Result};
use crate::types::{Channel, Header, Invoice, LightningPeer, Network, Payment};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tokio::sync::broadcast;

/// What changed, broadcast to UI watchers after each write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Header(u32),
    Channels,
    ClaimableBalance(u64),
    Invoice(String),
    Payment(String),
    Peers(Network),
    AddressIndex(u32),
}

#[derive(Default)]
struct Inner {
    header: Option<Header>,
    channels: Vec<Channel>,
    claimable_balance_sat: u64,
    invoices: BTreeMap<String, Invoice>,
    payments: BTreeMap<String, Payment>,
    peers: HashMap<Network, Vec<LightningPeer>>,
    address_index: Option<u32>,
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
    changes: broadcast::Sender<StateChange>,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self { inner: RwLock::new(Inner::default()), changes }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> { self.changes.subscribe() }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> T {
        f(&self.inner.read().unwrap_or_else(|p| p.into_inner()))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        f(&mut self.inner.write().unwrap_or_else(|p| p.into_inner()))
    }

    fn emit(&self, change: StateChange) {
        // No receivers is fine.
        let _ = self.changes.send(change);
    }
}

impl StateStore for MemoryStore {
    fn header(&self) -> Option<Header> { self.read(|s| s.header.clone()) }

    fn set_header(&self, header: Header) {
        let height = header.height;
        self.write(|s| s.header = Some(header));
        self.emit(StateChange::Header(height));
    }

    fn channels(&self) -> Vec<Channel> { self.read(|s| s.channels.clone()) }

    fn replace_channels(&self, refreshed: Vec<Channel>) {
        self.write(|s| s.channels = merge_channels(&s.channels, refreshed));
        self.emit(StateChange::Channels);
    }

    fn claimable_balance_sat(&self) -> u64 { self.read(|s| s.claimable_balance_sat) }

    fn set_claimable_balance_sat(&self, sat: u64) {
        self.write(|s| s.claimable_balance_sat = sat);
        self.emit(StateChange::ClaimableBalance(sat));
    }

    fn invoice(&self, payment_hash: &str) -> Option<Invoice> {
        self.read(|s| s.invoices.get(payment_hash).cloned())
    }

    fn invoices(&self) -> Vec<Invoice> { self.read(|s| s.invoices.values().cloned().collect()) }

    fn put_invoice(&self, invoice: Invoice) {
        let hash = invoice.payment_hash.clone();
        self.write(|s| s.invoices.insert(hash.clone(), invoice));
        self.emit(StateChange::Invoice(hash));
    }

    fn remove_invoice(&self, payment_hash: &str) -> bool {
        let removed = self.write(|s| s.invoices.remove(payment_hash).is_some());
        if removed {
            self.emit(StateChange::Invoice(payment_hash.to_string()));
        }
        removed
    }

    fn payment(&self, payment_hash: &str) -> Option<Payment> {
        self.read(|s| s.payments.get(payment_hash).cloned())
    }

    fn payments(&self) -> Vec<Payment> { self.read(|s| s.payments.values().cloned().collect()) }

    fn record_payment(&self, payment: Payment) -> bool {
        let hash = payment.payment_hash.clone();
        let inserted = self.write(|s| {
            if s.payments.contains_key(&hash) {
                return false;
            }
            s.payments.insert(hash.clone(), payment);
            true
        });
        if inserted {
            self.emit(StateChange::Payment(hash));
        }
        inserted
    }

    fn set_payment_note(&self, payment_hash: &str, note: &str) -> Result<()> {
        self.write(|s| match s.payments.get_mut(payment_hash) {
            Some(p) => {
                p.note = note.to_string();
                Ok(())
            }
            None => Err(Error::InvalidState(format!("no payment {payment_hash}"))),
        })?;
        self.emit(StateChange::Payment(payment_hash.to_string()));
        Ok(())
    }

    fn custom_peers(&self, network: Network) -> Vec<LightningPeer> {
        self.read(|s| s.peers.get(&network).cloned().unwrap_or_default())
    }

    fn add_custom_peer(&self, network: Network, peer: LightningPeer) -> bool {
        let added = self.write(|s| {
            let peers = s.peers.entry(network).or_default();
            if peers.contains(&peer) {
                return false;
            }
            peers.push(peer);
            true
        });
        if added {
            self.emit(StateChange::Peers(network));
        }
        added
    }

    fn address_index(&self) -> Option<u32> { self.read(|s| s.address_index) }

    fn set_address_index(&self, index: u32) {
        let current = self.write(|s| {
            let next = s.address_index.map_or(index, |i| i.max(index));
            s.address_index = Some(next);
            next
        });
        self.emit(StateChange::AddressIndex(current));
    }
}
