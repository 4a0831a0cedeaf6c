use crate::error::{Error, Result};
use crate::types::Network;
use lightning_invoice::{Bolt11Invoice, Bolt11InvoiceDescriptionRef, Currency};
use serde::Serialize;
use std::str::FromStr;

/// Fields of a bolt11 invoice the router and UI care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedInvoice {
    pub encoded: String,
    pub payment_hash: String,
    pub amount_msat: Option<u64>,
    pub description: Option<String>,
    pub payee: Option<String>,
    /// Unix seconds.
    pub timestamp: u64,
    pub expiry_secs: u64,
    pub network: Option<Network>,
}

impl DecodedInvoice {
    /// Amount rounded up to whole sats.
    pub fn amount_sat(&self) -> Option<u64> { self.amount_msat.map(|msat| msat.div_ceil(1000)) }
    pub fn expires_at(&self) -> u64 { self.timestamp.saturating_add(self.expiry_secs) }
    pub fn is_expired(&self, now_secs: u64) -> bool { now_secs >= self.expires_at() }
}

fn network_of(currency: Currency) -> Option<Network> {
    match currency {
        Currency::Bitcoin => Some(Network::Bitcoin),
        Currency::BitcoinTestnet => Some(Network::Testnet),
        Currency::Signet => Some(Network::Signet),
        Currency::Regtest => Some(Network::Regtest),
        _ => None,
    }
}

/// Offline bolt11 decode.
pub fn decode_bolt11(encoded: &str) -> Result<DecodedInvoice> {
    let invoice = Bolt11Invoice::from_str(encoded.trim())
        .map_err(|e| Error::Decode(format!("invalid invoice: {e}")))?;
    let description = match invoice.description() {
        Bolt11InvoiceDescriptionRef::Direct(d) => Some(d.to_string()),
        Bolt11InvoiceDescriptionRef::Hash(_) => None,
    };
    Ok(DecodedInvoice {
        encoded: encoded.trim().to_string(),
        payment_hash: invoice.payment_hash().to_string(),
        amount_msat: invoice.amount_milli_satoshis(),
        description,
        payee: Some(invoice.recover_payee_pub_key().to_string()),
        timestamp: invoice.duration_since_epoch().as_secs(),
        expiry_secs: invoice.expiry_time().as_secs(),
        network: network_of(invoice.currency()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::{sha256, Hash};
    use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
    use lightning_invoice::{InvoiceBuilder, PaymentSecret};
    use std::time::Duration;

    fn signed_invoice(currency: Currency) -> (String, PublicKey) {
        let secp = Secp256k1::new();
        let key = SecretKey::from_slice(&[0x42; 32]).unwrap();
        let invoice = InvoiceBuilder::new(currency)
            .description("coffee".into())
            .payment_hash(sha256::Hash::from_slice(&[0x01; 32]).unwrap())
            .payment_secret(PaymentSecret([0x02; 32]))
            .amount_milli_satoshis(250_000)
            .duration_since_epoch(Duration::from_secs(1_700_000_000))
            .expiry_time(Duration::from_secs(600))
            .min_final_cltv_expiry_delta(144)
            .build_signed(|msg| secp.sign_ecdsa_recoverable(msg, &key))
            .unwrap();
        (invoice.to_string(), PublicKey::from_secret_key(&secp, &key))
    }

    #[test]
    fn decodes_a_signed_invoice() {
        let (encoded, payee) = signed_invoice(Currency::Regtest);
        assert!(encoded.starts_with("lnbcrt"));

        let decoded = decode_bolt11(&format!("  {encoded}\n")).unwrap();
        assert_eq!(decoded.encoded, encoded);
        assert_eq!(decoded.payment_hash, "01".repeat(32));
        assert_eq!(decoded.amount_msat, Some(250_000));
        assert_eq!(decoded.amount_sat(), Some(250));
        assert_eq!(decoded.description.as_deref(), Some("coffee"));
        assert_eq!(decoded.payee, Some(payee.to_string()));
        assert_eq!(decoded.network, Some(Network::Regtest));
        assert_eq!(decoded.timestamp, 1_700_000_000);
        assert_eq!(decoded.expiry_secs, 600);
        assert!(decoded.is_expired(1_700_000_600));
    }

    #[test]
    fn currency_maps_to_network() {
        let (encoded, _) = signed_invoice(Currency::Signet);
        assert_eq!(decode_bolt11(&encoded).unwrap().network, Some(Network::Signet));
        let (encoded, _) = signed_invoice(Currency::Bitcoin);
        assert_eq!(decode_bolt11(&encoded).unwrap().network, Some(Network::Bitcoin));
    }

    #[test]
    fn tampered_invoice_is_rejected() {
        let (encoded, _) = signed_invoice(Currency::Regtest);
        let mut chars: Vec<char> = encoded.chars().collect();
        let i = chars.len() / 2;
        chars[i] = if chars[i] == 'q' { 'p' } else { 'q' };
        let tampered: String = chars.into_iter().collect();
        assert!(matches!(decode_bolt11(&tampered), Err(Error::Decode(_))));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(decode_bolt11("lnbc1notaninvoice"), Err(Error::Decode(_))));
        assert!(matches!(decode_bolt11(""), Err(Error::Decode(_))));
    }

    #[test]
    fn amount_rounds_up_and_expiry_adds() {
        let invoice = DecodedInvoice {
            encoded: "lnbcrt1".into(),
            payment_hash: "00".repeat(32),
            amount_msat: Some(1_500),
            description: None,
            payee: None,
            timestamp: 1_000,
            expiry_secs: 3_600,
            network: Some(Network::Regtest),
        };
        assert_eq!(invoice.amount_sat(), Some(2));
        assert_eq!(invoice.expires_at(), 4_600);
        assert!(!invoice.is_expired(4_599));
        assert!(invoice.is_expired(4_600));
    }
}
