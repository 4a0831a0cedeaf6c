//! BIP85 - Deterministic Entropy from BIP32 Keychains
//!
//! The Lightning node seed is a BIP85 child of the wallet mnemonic, so the
//! node identity key is isolated from the on-chain keys while sharing one root.
//!
//! Reference: https://bips.xyz/85

use crate::error::{Error, Result};
use bip39::Mnemonic;
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::Secp256k1;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::str::FromStr;
use zeroize::Zeroizing;

/// BIP85 application indices
pub const INDEX_LIGHTNING: u32 = 0;

/// 83696968 = "BIP85" in ASCII
const PURPOSE: u32 = 83696968;
const APP_HEX: u32 = 128169;

/// Raw 64 bytes of BIP85 entropy at `path` below the master key.
pub fn derive_entropy(master: &Xpriv, path: &str) -> Result<Zeroizing<[u8; 64]>> {
    let secp = Secp256k1::new();
    let path = DerivationPath::from_str(path)
        .map_err(|e| Error::Derivation(format!("bip85 path: {e}")))?;
    let derived = master
        .derive_priv(&secp, &path)
        .map_err(|e| Error::Derivation(e.to_string()))?;

    let mut hmac = Hmac::<Sha512>::new_from_slice(b"bip-entropy-from-k")
        .map_err(|e| Error::Derivation(format!("hmac: {e}")))?;
    hmac.update(&derived.private_key.secret_bytes());
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&hmac.finalize().into_bytes());
    Ok(out)
}

fn master_from_mnemonic(master_mnemonic: &str, passphrase: Option<&str>) -> Result<Xpriv> {
    let mnemonic = Mnemonic::parse_normalized(master_mnemonic)
        .map_err(|e| Error::Derivation(format!("invalid mnemonic: {e}")))?;
    let seed = Zeroizing::new(mnemonic.to_seed(passphrase.unwrap_or("")));
    Xpriv::new_master(bitcoin::Network::Bitcoin, seed.as_ref())
        .map_err(|e| Error::Derivation(e.to_string()))
}

/// Derive `num_bytes` of hex entropy (HEX application), 16..=64 bytes.
pub fn derive_hex(master: &Xpriv, num_bytes: usize, index: u32) -> Result<Zeroizing<Vec<u8>>> {
    if !(16..=64).contains(&num_bytes) {
        return Err(Error::Derivation(format!("hex length {num_bytes} outside 16..=64")));
    }
    let entropy = derive_entropy(master, &format!("m/{PURPOSE}'/{APP_HEX}'/{num_bytes}'/{index}'"))?;
    Ok(Zeroizing::new(entropy[..num_bytes].to_vec()))
}

/// 32-byte Lightning node seed for the wallet mnemonic.
pub fn derive_lightning_seed(master_mnemonic: &str, passphrase: Option<&str>) -> Result<Zeroizing<[u8; 32]>> {
    let master = master_from_mnemonic(master_mnemonic, passphrase)?;
    let bytes = derive_hex(&master, 32, INDEX_LIGHTNING)?;
    let mut seed = Zeroizing::new([0u8; 32]);
    seed.copy_from_slice(&bytes);
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_deterministic_derivation() {
        let a = derive_lightning_seed(TEST_MNEMONIC, None).unwrap();
        let b = derive_lightning_seed(TEST_MNEMONIC, None).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn test_passphrase_changes_seed() {
        let plain = derive_lightning_seed(TEST_MNEMONIC, None).unwrap();
        let salted = derive_lightning_seed(TEST_MNEMONIC, Some("TREZOR")).unwrap();
        assert_ne!(*plain, *salted);
    }

    #[test]
    fn test_hex_length_bounds() {
        let master = master_from_mnemonic(TEST_MNEMONIC, None).unwrap();
        assert_eq!(derive_hex(&master, 16, 0).unwrap().len(), 16);
        assert_eq!(derive_hex(&master, 64, 0).unwrap().len(), 64);
        assert!(derive_hex(&master, 8, 0).is_err());
        assert_ne!(*derive_hex(&master, 32, 0).unwrap(), *derive_hex(&master, 32, 1).unwrap());
    }

    #[test]
    fn test_invalid_mnemonic() {
        assert!(derive_lightning_seed("abandon abandon", None).is_err());
    }
}
