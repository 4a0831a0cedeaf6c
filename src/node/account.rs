use crate::error::{Error, Result};
use crate::keys::{bip85, WalletSeed};
use crate::storage::{keys, VerifiedStorage};
use crate::types::Network;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;
use zeroize::Zeroize;

/// Node account: a name and the 32-byte node seed (hex).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningAccount {
    pub name: String,
    pub seed: String,
}

impl fmt::Debug for LightningAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LightningAccount").field("name", &self.name).field("seed", &"<redacted>").finish()
    }
}

impl Drop for LightningAccount {
    fn drop(&mut self) { self.seed.zeroize(); }
}

impl LightningAccount {
    pub fn derive(seed: &WalletSeed, name: &str) -> Result<Self> {
        let passphrase = Some(seed.passphrase()).filter(|p| !p.is_empty());
        let node_seed = bip85::derive_lightning_seed(seed.mnemonic(), passphrase)?;
        Ok(Self { name: name.to_string(), seed: hex::encode::<&[u8]>(node_seed.as_ref()) })
    }
}

/// Stored account for `network`, or derive and persist it.
pub fn load_or_derive(storage: &VerifiedStorage, seed: &WalletSeed, network: Network, name: &str) -> Result<LightningAccount> {
    let key = keys::lightning_account(network);
    if let Some(account) = storage.read_json::<LightningAccount>(&key)? {
        if account.seed.len() != 64 {
            return Err(Error::Setup(format!("stored lightning account for {network} is malformed")));
        }
        return Ok(account);
    }
    let account = LightningAccount::derive(seed, name)?;
    storage.write_json(&key, &account)?;
    info!(network = %network, name, "lightning account created");
    Ok(account)
}
