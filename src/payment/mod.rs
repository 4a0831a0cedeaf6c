//! Payment - decode and validate what the user scanned or pasted
//!
//! ```text
//! raw input ─▶ classify ─┬─ bolt11 ──▶ node.decode ─▶ expiry ─▶ liquidity ─▶ Send / EnterAmount
//!                        ├─ node uri ─▶ onion check ─▶ add_peer (timeout) ─▶ PeerConnected
//!                        └─ lnurl ───▶ GET ─▶ LnurlWithdraw / LnurlPay
//! ```
//!
//! Nothing here moves funds: the router returns a [`Decision`] and the UI
//! confirms it.

mod failure;
pub mod input;
mod invoice;
pub mod lnurl;

pub use failure::PaymentFailureReason;
pub use input::{classify, PaymentInput};
pub use invoice::{decode_bolt11, DecodedInvoice};
pub use lnurl::{LnurlHttp, LnurlRequest, PayRequest, WithdrawRequest};
#[cfg(feature = "lnurl")]
pub use lnurl::ReqwestLnurl;

use crate::error::{Error, Result};
use crate::node::LightningNode;
use crate::state::{receivable_sat, spendable_sat, StateStore};
use crate::types::{now_secs, Invoice, LightningPeer, Network};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const WITHDRAW_INVOICE_EXPIRY_SECS: u32 = 3_600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Send { amount_sat: u64, invoice: String },
    EnterAmount { invoice: String },
    PeerConnected { peer: LightningPeer },
    LnurlWithdraw(WithdrawRequest),
    LnurlPay(PayRequest),
}

pub struct PaymentRouter {
    node: Arc<dyn LightningNode>,
    store: Arc<dyn StateStore>,
    lnurl: Arc<dyn LnurlHttp>,
    network: Network,
    peer_timeout: Duration,
}

impl PaymentRouter {
    pub fn new(node: Arc<dyn LightningNode>, store: Arc<dyn StateStore>, lnurl: Arc<dyn LnurlHttp>, network: Network) -> Self {
        Self { node, store, lnurl, network, peer_timeout: Duration::from_secs(10) }
    }

    pub fn with_peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer_timeout = timeout;
        self
    }

    pub async fn process_input(&self, raw: &str) -> Result<Decision> {
        match classify(raw)? {
            PaymentInput::Bolt11(invoice) => self.process_invoice(&invoice).await,
            PaymentInput::NodeUri(peer) => self.connect_peer(peer).await,
            PaymentInput::Lnurl(encoded) => self.resolve_lnurl(&encoded).await,
        }
    }

    async fn decode(&self, invoice: &str) -> Result<DecodedInvoice> {
        let decoded = self.node.decode_invoice(invoice).await.map_err(|e| match e {
            Error::Decode(_) => e,
            other => Error::Decode(other.to_string()),
        })?;
        if let Some(network) = decoded.network {
            if network != self.network {
                return Err(Error::Decode(format!("invoice is for {network}, wallet is on {}", self.network)));
            }
        }
        Ok(decoded)
    }

    async fn process_invoice(&self, invoice: &str) -> Result<Decision> {
        let decoded = self.decode(invoice).await?;
        let Some(amount_sat) = decoded.amount_sat() else {
            debug!(payment_hash = %decoded.payment_hash, "invoice without amount");
            return Ok(Decision::EnterAmount { invoice: decoded.encoded });
        };
        if decoded.is_expired(now_secs()) {
            return Err(Error::Decode("invoice expired".into()));
        }
        self.ensure_spendable(amount_sat)?;
        Ok(Decision::Send { amount_sat, invoice: decoded.encoded })
    }

    fn ensure_spendable(&self, amount_sat: u64) -> Result<()> {
        let available = spendable_sat(&self.store.channels());
        if amount_sat > available {
            return Err(Error::liquidity(amount_sat, available));
        }
        Ok(())
    }

    /// Connect to a peer and remember it for the wallet's network.
    pub async fn connect_peer(&self, peer: LightningPeer) -> Result<Decision> {
        if peer.is_onion() {
            return Err(Error::Unsupported(format!("onion peer {}", peer.address)));
        }
        match tokio::time::timeout(self.peer_timeout, self.node.add_peer(&peer)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(Error::Timeout(format!("connecting to {peer}"))),
        }
        if self.store.add_custom_peer(self.network, peer.clone()) {
            info!(%peer, "custom peer saved");
        }
        Ok(Decision::PeerConnected { peer })
    }

    pub async fn resolve_lnurl(&self, encoded: &str) -> Result<Decision> {
        let url = lnurl::decode_lnurl(encoded)?;
        let body = self.lnurl.get_json(&url).await?;
        Ok(match lnurl::parse_request(&body, &url)? {
            LnurlRequest::Withdraw(request) => Decision::LnurlWithdraw(request),
            LnurlRequest::Pay(request) => Decision::LnurlPay(request),
        })
    }

    /// Withdraw `amount_sat` from an LNURL service into a fresh invoice.
    pub async fn withdraw(&self, request: &WithdrawRequest, amount_sat: u64) -> Result<Invoice> {
        let (min_sat, max_sat) = (request.min_sat(), request.max_sat());
        if amount_sat < min_sat || amount_sat > max_sat {
            return Err(Error::LnurlLimit { amount_sat, min_sat, max_sat });
        }
        let receivable = receivable_sat(&self.store.channels());
        if amount_sat > receivable {
            return Err(Error::liquidity(amount_sat, receivable));
        }

        let invoice = self
            .node
            .create_invoice(Some(amount_sat), &request.default_description, WITHDRAW_INVOICE_EXPIRY_SECS)
            .await?;
        self.store.put_invoice(invoice.clone());

        let nonce = lnurl::fresh_nonce();
        let url = lnurl::build_callback(&request.callback, &[("k1", &request.k1), ("pr", &invoice.encoded), ("nonce", &nonce)]);
        let outcome = match self.lnurl.get_json(&url).await {
            Ok(response) => lnurl::interpret_status(&response),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            warn!(domain = %request.domain, error = %e, "withdraw rejected");
            self.store.remove_invoice(&invoice.payment_hash);
            return Err(e);
        }
        info!(domain = %request.domain, amount_sat, "withdraw requested");
        Ok(invoice)
    }

    /// Fetch an invoice for `amount_sat` from an LNURL-pay service.
    pub async fn pay_lnurl(&self, request: &PayRequest, amount_sat: u64) -> Result<Decision> {
        let (min_sat, max_sat) = (request.min_sat(), request.max_sat());
        if amount_sat < min_sat || amount_sat > max_sat {
            return Err(Error::LnurlLimit { amount_sat, min_sat, max_sat });
        }
        self.ensure_spendable(amount_sat)?;

        let amount_msat = (amount_sat * 1000).to_string();
        let nonce = lnurl::fresh_nonce();
        let url = lnurl::build_callback(&request.callback, &[("amount", &amount_msat), ("nonce", &nonce)]);
        let response = self.lnurl.get_json(&url).await?;
        let pr = lnurl::payment_request(&response)?;

        let decoded = self.decode(&pr).await?;
        if decoded.amount_msat != Some(amount_sat * 1000) {
            return Err(Error::Decode(format!(
                "service returned invoice for {:?} msat, expected {}",
                decoded.amount_msat,
                amount_sat * 1000
            )));
        }
        if decoded.is_expired(now_secs()) {
            return Err(Error::Decode("invoice expired".into()));
        }
        Ok(Decision::Send { amount_sat, invoice: decoded.encoded })
    }
}
