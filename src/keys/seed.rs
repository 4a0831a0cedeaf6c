use crate::error::{Error, Result};
use crate::storage::{keys, VerifiedStorage};
use bip39::Mnemonic;
use rand::RngCore;
use std::fmt;
use tracing::info;
use zeroize::Zeroizing;

/// The wallet's single root secret: mnemonic plus optional passphrase.
pub struct WalletSeed {
    mnemonic: Zeroizing<String>,
    passphrase: Zeroizing<String>,
}

impl fmt::Debug for WalletSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSeed").field("mnemonic", &"<redacted>").finish()
    }
}

impl WalletSeed {
    pub fn from_mnemonic(mnemonic: &str, passphrase: &str) -> Result<Self> {
        let parsed = Mnemonic::parse_normalized(mnemonic)
            .map_err(|e| Error::Derivation(format!("invalid mnemonic: {e}")))?;
        Ok(Self {
            mnemonic: Zeroizing::new(parsed.to_string()),
            passphrase: Zeroizing::new(passphrase.to_string()),
        })
    }

    /// Fresh 12-word mnemonic from OS randomness.
    pub fn generate() -> Result<Self> {
        let mut entropy = Zeroizing::new([0u8; 16]);
        rand::rngs::OsRng.fill_bytes(entropy.as_mut());
        let mnemonic = Mnemonic::from_entropy(entropy.as_ref())
            .map_err(|e| Error::Derivation(e.to_string()))?;
        Ok(Self {
            mnemonic: Zeroizing::new(mnemonic.to_string()),
            passphrase: Zeroizing::new(String::new()),
        })
    }

    pub fn load(storage: &VerifiedStorage) -> Result<Option<Self>> {
        let Some(mnemonic) = storage.read(keys::MNEMONIC).map(Zeroizing::new) else {
            return Ok(None);
        };
        let passphrase = Zeroizing::new(storage.read(keys::PASSPHRASE).unwrap_or_default());
        Self::from_mnemonic(&mnemonic, &passphrase).map(Some)
    }

    /// Load the sealed seed, or create and seal one on first run.
    pub fn load_or_create(storage: &VerifiedStorage) -> Result<Self> {
        if let Some(seed) = Self::load(storage)? {
            return Ok(seed);
        }
        let seed = Self::generate()?;
        seed.seal(storage)?;
        info!("generated new wallet seed");
        Ok(seed)
    }

    pub fn seal(&self, storage: &VerifiedStorage) -> Result<()> {
        storage.write(keys::MNEMONIC, &self.mnemonic)?;
        storage.write(keys::PASSPHRASE, &self.passphrase)
    }

    pub fn mnemonic(&self) -> &str { &self.mnemonic }
    pub fn passphrase(&self) -> &str { &self.passphrase }

    /// 64-byte BIP39 seed.
    pub fn to_seed(&self) -> Result<Zeroizing<[u8; 64]>> {
        let mnemonic = Mnemonic::parse_normalized(&self.mnemonic)
            .map_err(|e| Error::Derivation(e.to_string()))?;
        Ok(Zeroizing::new(mnemonic.to_seed(self.passphrase.as_str())))
    }
}
