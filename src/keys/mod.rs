//! Keys - deterministic address derivation and the receive-address allocator
//!
//! ```text
//! mnemonic + passphrase ──▶ BIP39 seed ──▶ BIP32 root
//!                                             ├── m/84'/c'/0'/0/i  p2wpkh
//!                                             ├── m/49'/c'/0'/0/i  p2sh-p2wpkh
//!                                             ├── m/44'/c'/0'/0/i  p2pkh
//!                                             └── BIP85 HEX child  Lightning node seed
//! ```

pub mod bip85;
mod seed;

pub use seed::WalletSeed;

use crate::error::{Error, Result};
use crate::state::StateStore;
use crate::types::Network;
use bip39::Mnemonic;
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::{Address, CompressedPublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

/// Highest non-hardened BIP32 child index.
const MAX_INDEX: u32 = 0x7fff_ffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressType {
    #[default]
    P2wpkh,
    P2shP2wpkh,
    P2pkh,
}

impl AddressType {
    pub fn purpose(&self) -> u32 {
        match self { AddressType::P2wpkh => 84, AddressType::P2shP2wpkh => 49, AddressType::P2pkh => 44 }
    }
    pub fn as_str(&self) -> &'static str {
        match self { AddressType::P2wpkh => "p2wpkh", AddressType::P2shP2wpkh => "p2sh-p2wpkh", AddressType::P2pkh => "p2pkh" }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for AddressType {
    type Err = Error;
    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "p2wpkh" => Ok(AddressType::P2wpkh),
            "p2sh-p2wpkh" | "p2sh" => Ok(AddressType::P2shP2wpkh),
            "p2pkh" => Ok(AddressType::P2pkh),
            other => Err(Error::Derivation(format!("unsupported address type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAddress {
    pub address: String,
    pub path: String,
    pub public_key: String,
    /// Hex of the output script, used for chain subscriptions.
    pub script_pubkey: String,
}

/// Receive path for `index`: `m/{purpose}'/{coin}'/0'/0/{index}`.
pub fn receive_path(address_type: AddressType, network: Network, index: u32) -> String {
    format!("m/{}'/{}'/0'/0/{}", address_type.purpose(), network.coin_type(), index)
}

/// Derive one address from a mnemonic. Pure: same inputs, same output.
pub fn derive_address(
    mnemonic: &str,
    passphrase: &str,
    path: &str,
    address_type: AddressType,
    network: Network,
) -> Result<DerivedAddress> {
    let mnemonic = Mnemonic::parse_normalized(mnemonic)
        .map_err(|e| Error::Derivation(format!("invalid mnemonic: {e}")))?;
    let seed = Zeroizing::new(mnemonic.to_seed(passphrase));
    derive_from_seed(seed.as_ref(), path, address_type, network)
}

/// Same as [`derive_address`] starting from a 64-byte BIP39 seed.
pub fn derive_from_seed(seed: &[u8], path: &str, address_type: AddressType, network: Network) -> Result<DerivedAddress> {
    let secp = Secp256k1::new();
    let root = Xpriv::new_master(network.to_bitcoin(), seed)
        .map_err(|e| Error::Derivation(e.to_string()))?;
    let parsed = DerivationPath::from_str(path)
        .map_err(|e| Error::Derivation(format!("malformed path '{path}': {e}")))?;
    let child = root
        .derive_priv(&secp, &parsed)
        .map_err(|e| Error::Derivation(e.to_string()))?;
    let public_key = CompressedPublicKey(child.private_key.public_key(&secp));

    let btc_network = network.to_bitcoin();
    let address = match address_type {
        AddressType::P2wpkh => Address::p2wpkh(&public_key, btc_network),
        AddressType::P2shP2wpkh => Address::p2shwpkh(&public_key, btc_network),
        AddressType::P2pkh => Address::p2pkh(public_key.pubkey_hash(), btc_network),
    };

    Ok(DerivedAddress {
        address: address.to_string(),
        path: path.to_string(),
        public_key: public_key.to_string(),
        script_pubkey: address.script_pubkey().to_hex_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiveAddress {
    pub index: u32,
    #[serde(flatten)]
    pub derived: DerivedAddress,
}

/// Hands out receive addresses with strictly increasing, never reused indices.
pub struct ReceiveAddresses {
    seed: Zeroizing<[u8; 64]>,
    address_type: AddressType,
    network: Network,
    next_index: AtomicU32,
    store: Option<Arc<dyn StateStore>>,
}

impl ReceiveAddresses {
    pub fn new(seed: &WalletSeed, address_type: AddressType, network: Network) -> Result<Self> {
        Ok(Self { seed: seed.to_seed()?, address_type, network, next_index: AtomicU32::new(0), store: None })
    }

    /// Continue above the last index recorded in `store`.
    pub fn resume(seed: &WalletSeed, address_type: AddressType, network: Network, store: Arc<dyn StateStore>) -> Result<Self> {
        let start = store.address_index().map_or(0, |i| i.saturating_add(1));
        debug!(start, "resuming receive addresses");
        Ok(Self {
            seed: seed.to_seed()?,
            address_type,
            network,
            next_index: AtomicU32::new(start),
            store: Some(store),
        })
    }

    pub fn address_type(&self) -> AddressType { self.address_type }

    /// Index the next call to [`next`](Self::next) will use.
    pub fn peek_index(&self) -> u32 { self.next_index.load(Ordering::SeqCst) }

    pub fn next(&self) -> Result<ReceiveAddress> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        if index > MAX_INDEX {
            return Err(Error::Derivation("receive address index space exhausted".into()));
        }
        let path = receive_path(self.address_type, self.network, index);
        let derived = derive_from_seed(self.seed.as_ref(), &path, self.address_type, self.network)?;
        if let Some(store) = &self.store {
            store.set_address_index(index);
        }
        Ok(ReceiveAddress { index, derived })
    }
}
