//! LNURL - bech32 resolution, request parsing and callback building (LUD-01/03/06)

use crate::error::{Error, Result};
use async_trait::async_trait;
use bitcoin::bech32;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub callback: String,
    pub k1: String,
    /// msat
    pub min_withdrawable: u64,
    /// msat
    pub max_withdrawable: u64,
    #[serde(default)]
    pub default_description: String,
    #[serde(default)]
    pub domain: String,
}

impl WithdrawRequest {
    pub fn min_sat(&self) -> u64 { self.min_withdrawable.div_ceil(1000) }
    pub fn max_sat(&self) -> u64 { self.max_withdrawable / 1000 }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayRequest {
    pub callback: String,
    /// msat
    pub min_sendable: u64,
    /// msat
    pub max_sendable: u64,
    #[serde(default)]
    pub metadata: String,
    #[serde(default)]
    pub comment_allowed: u32,
    #[serde(default)]
    pub domain: String,
}

impl PayRequest {
    pub fn min_sat(&self) -> u64 { self.min_sendable.div_ceil(1000) }
    pub fn max_sat(&self) -> u64 { self.max_sendable / 1000 }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LnurlRequest {
    Withdraw(WithdrawRequest),
    Pay(PayRequest),
}

/// HTTP GET returning JSON; the only network call LNURL flows make.
#[async_trait]
pub trait LnurlHttp: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Value>;
}

#[cfg(feature = "lnurl")]
pub struct ReqwestLnurl {
    client: reqwest::Client,
}

#[cfg(feature = "lnurl")]
impl ReqwestLnurl {
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Connectivity(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "lnurl")]
#[async_trait]
impl LnurlHttp for ReqwestLnurl {
    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Connectivity(format!("lnurl request: {e}")))?;
        response.json::<Value>().await.map_err(|e| Error::Decode(format!("lnurl response: {e}")))
    }
}

/// `lnurl1...` → the URL it encodes.
pub fn decode_lnurl(encoded: &str) -> Result<String> {
    let (hrp, data) = bech32::decode(encoded).map_err(|e| Error::Decode(format!("lnurl bech32: {e}")))?;
    if !hrp.to_string().eq_ignore_ascii_case("lnurl") {
        return Err(Error::Decode(format!("unexpected bech32 prefix '{hrp}'")));
    }
    let url = String::from_utf8(data).map_err(|_| Error::Decode("lnurl is not utf-8".into()))?;
    check_url(&url)?;
    Ok(url)
}

/// Host part of an http(s) URL.
pub fn domain_of(url: &str) -> Option<String> {
    let rest = url.split_once("://")?.1;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = if host.starts_with('[') {
        host.split_inclusive(']').next().unwrap_or(host)
    } else {
        host.split(':').next().unwrap_or(host)
    };
    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

fn check_url(url: &str) -> Result<()> {
    let domain = domain_of(url).ok_or_else(|| Error::Decode(format!("lnurl target '{url}' is not a url")))?;
    if domain.ends_with(".onion") {
        return Err(Error::Unsupported("onion lnurl services".into()));
    }
    let local = domain == "localhost" || domain == "127.0.0.1" || domain == "[::1]";
    if !url.starts_with("https://") && !local {
        return Err(Error::Decode("lnurl services must use https".into()));
    }
    Ok(())
}

/// Reject `{"status":"ERROR"}` bodies.
fn check_error(value: &Value) -> Result<()> {
    if value.get("status").and_then(Value::as_str).is_some_and(|s| s.eq_ignore_ascii_case("error")) {
        let reason = value.get("reason").and_then(Value::as_str).unwrap_or("unknown error");
        return Err(Error::Lnurl(reason.to_string()));
    }
    Ok(())
}

/// Parse the first-step response of an LNURL.
pub fn parse_request(value: &Value, url: &str) -> Result<LnurlRequest> {
    check_error(value)?;
    let domain = domain_of(url).unwrap_or_default();
    match value.get("tag").and_then(Value::as_str) {
        Some("withdrawRequest") => {
            let mut request: WithdrawRequest = serde_json::from_value(value.clone())
                .map_err(|e| Error::Decode(format!("withdraw request: {e}")))?;
            request.domain = domain;
            Ok(LnurlRequest::Withdraw(request))
        }
        Some("payRequest") => {
            let mut request: PayRequest = serde_json::from_value(value.clone())
                .map_err(|e| Error::Decode(format!("pay request: {e}")))?;
            request.domain = domain;
            Ok(LnurlRequest::Pay(request))
        }
        Some(tag) => Err(Error::Unsupported(format!("lnurl tag '{tag}'"))),
        None => Err(Error::Decode("lnurl response has no tag".into())),
    }
}

/// `{"status":"OK"}` → Ok, `{"status":"ERROR","reason":..}` → `Error::Lnurl`.
pub fn interpret_status(value: &Value) -> Result<()> {
    check_error(value)?;
    match value.get("status").and_then(Value::as_str) {
        Some(s) if s.eq_ignore_ascii_case("ok") => Ok(()),
        _ => Err(Error::Decode("malformed lnurl callback response".into())),
    }
}

/// Invoice (`pr`) from a pay callback response.
pub fn payment_request(value: &Value) -> Result<String> {
    check_error(value)?;
    value
        .get("pr")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Decode("pay callback returned no invoice".into()))
}

/// Append query parameters to `callback`, keeping any it already carries.
pub fn build_callback(callback: &str, params: &[(&str, &str)]) -> String {
    let mut url = callback.to_string();
    let mut sep = if callback.contains('?') { '&' } else { '?' };
    for (key, value) in params {
        url.push(sep);
        url.push_str(&percent_encode(key));
        url.push('=');
        url.push_str(&percent_encode(value));
        sep = '&';
    }
    url
}

/// Fresh random nonce, hex.
pub fn fresh_nonce() -> String {
    let mut bytes = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for &b in value.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
