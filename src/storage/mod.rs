//! Storage - per-key secure keychain with verify-after-write
//!
//! ```text
//! WalletSeed / LightningAccount
//!          │ write(key, value)
//!          ▼
//!   VerifiedStorage ── store ──▶ SecureStorage (platform keychain)
//!          │        ◀─ retrieve ─┘
//!          └─ mismatch → remove(key) + Error::StorageIntegrity
//! ```
//!
//! The platform keychain is an external collaborator; [`FileKeychain`] and
//! [`MemoryKeychain`] cover desktop/CLI use and tests.

mod keychain;

pub use keychain::{FileKeychain, MemoryKeychain};

use crate::error::{Error, Result};
use crate::types::Network;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage keys used by the core.
pub mod keys {
    use crate::types::Network;

    pub const MNEMONIC: &str = "wallet/mnemonic";
    pub const PASSPHRASE: &str = "wallet/passphrase";

    pub fn lightning_account(network: Network) -> String {
        format!("lightning/account/{}", network.as_str())
    }
}

/// Secure key/value storage as exposed by the host platform.
pub trait SecureStorage: Send + Sync {
    fn store(&self, key: &str, value: &str) -> bool;
    fn retrieve(&self, key: &str) -> Option<String>;
    fn remove(&self, key: &str) -> bool;
}

/// Wraps a [`SecureStorage`] so every write is read back and compared.
#[derive(Clone)]
pub struct VerifiedStorage {
    inner: Arc<dyn SecureStorage>,
}

impl VerifiedStorage {
    pub fn new(inner: Arc<dyn SecureStorage>) -> Self { Self { inner } }

    pub fn write(&self, key: &str, value: &str) -> Result<()> {
        if !self.inner.store(key, value) {
            return Err(Error::Storage(format!("keychain rejected write for '{key}'")));
        }
        match self.inner.retrieve(key) {
            Some(stored) if stored == value => {
                debug!(key, "secure write verified");
                Ok(())
            }
            _ => {
                warn!(key, "secure write did not read back, removing entry");
                self.inner.remove(key);
                Err(Error::StorageIntegrity { key: key.to_string() })
            }
        }
    }

    pub fn read(&self, key: &str) -> Option<String> { self.inner.retrieve(key) }

    pub fn delete(&self, key: &str) -> bool { self.inner.remove(key) }

    pub fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.write(key, &serde_json::to_string(value)?)
    }

    pub fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read(key) {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)
                .map_err(|e| Error::Storage(format!("'{key}' is not valid json: {e}")))?)),
            None => Ok(None),
        }
    }

    /// Remove everything the core ever wrote.
    pub fn wipe_wallet(&self) {
        self.delete(keys::MNEMONIC);
        self.delete(keys::PASSPHRASE);
        for network in [Network::Bitcoin, Network::Testnet, Network::Signet, Network::Regtest] {
            self.delete(&keys::lightning_account(network));
        }
    }
}

/// Application data root: `LIGHTKEEPER_ROOT`, else the platform data dir.
pub fn data_root() -> PathBuf {
    std::env::var("LIGHTKEEPER_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("lightkeeper"))
}
