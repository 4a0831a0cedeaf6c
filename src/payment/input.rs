//! Classify raw user input (scanned QR, pasted text) before any decoding.

use crate::error::{Error, Result};
use crate::types::LightningPeer;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentInput {
    /// Bare, lowercase bolt11 invoice.
    Bolt11(String),
    NodeUri(LightningPeer),
    /// Bare, lowercase bech32 LNURL.
    Lnurl(String),
}

fn invoice_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:lightning:)?(?://)?(ln(?:bcrt|tbs|bc|tb)[0-9a-z]+)(?:\?.*)?$").expect("static regex")
    })
}

fn lnurl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:lightning:)?(?://)?(lnurl1[02-9ac-hj-np-z]+)(?:\?.*)?$").expect("static regex")
    })
}

fn node_uri_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{66}@(?:[^\s:@\[\]]+|\[[0-9a-fA-F:]+\]):\d{1,5}$").expect("static regex")
    })
}

pub fn classify(raw: &str) -> Result<PaymentInput> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::Decode("empty input".into()));
    }
    if node_uri_re().is_match(trimmed) {
        return trimmed.parse().map(PaymentInput::NodeUri);
    }
    let lower = trimmed.to_ascii_lowercase();
    if let Some(caps) = lnurl_re().captures(&lower) {
        return Ok(PaymentInput::Lnurl(caps[1].to_string()));
    }
    if let Some(caps) = invoice_re().captures(&lower) {
        return Ok(PaymentInput::Bolt11(caps[1].to_string()));
    }
    Err(Error::Decode("not a lightning invoice, node uri or lnurl".into()))
}
