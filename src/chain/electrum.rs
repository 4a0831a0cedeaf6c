//! Electrum backend over `bdk_electrum::electrum_client`.
//!
//! The client is blocking; every call runs on `spawn_blocking`.

use super::backend::{ChainBackend, MerklePosition, RawHeader, RawTransaction, TxHistoryItem, TxOutput};
use crate::error::{Error, Result};
use crate::types::{ElectrumPeer, ElectrumProtocol, Network};
use async_trait::async_trait;
use bdk_electrum::electrum_client::{self, Client, ConfigBuilder, ElectrumApi, Param};
use bitcoin::{ScriptBuf, Txid};
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT_SECS: u8 = 10;

pub struct ElectrumBackend {
    client: RwLock<Option<Arc<Client>>>,
    peer: RwLock<Option<ElectrumPeer>>,
    timeout_secs: u8,
}

impl Default for ElectrumBackend {
    fn default() -> Self { Self::new() }
}

impl ElectrumBackend {
    pub fn new() -> Self {
        Self { client: RwLock::new(None), peer: RwLock::new(None), timeout_secs: DEFAULT_TIMEOUT_SECS }
    }

    pub fn with_timeout(mut self, secs: u8) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn client(&self) -> Result<Arc<Client>> {
        self.client
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| Error::Connectivity("electrum not connected".into()))
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Client) -> std::result::Result<T, electrum_client::Error> + Send + 'static,
    {
        let client = self.client()?;
        let result = tokio::task::spawn_blocking(move || f(&client))
            .await
            .map_err(|e| Error::Chain(format!("electrum task: {e}")))?;
        result.map_err(|e| {
            if is_transport_error(&e) {
                self.disconnect(&e);
                Error::Connectivity(format!("electrum: {e}"))
            } else {
                Error::Chain(format!("electrum: {e}"))
            }
        })
    }

    /// Forget the client so the next `connect` builds a fresh socket.
    fn disconnect(&self, cause: &electrum_client::Error) {
        let peer = self.peer.write().unwrap_or_else(|p| p.into_inner()).take();
        *self.client.write().unwrap_or_else(|p| p.into_inner()) = None;
        if let Some(peer) = peer {
            warn!(host = %peer.host, error = %cause, "electrum connection lost");
        }
    }
}

fn is_transport_error(e: &electrum_client::Error) -> bool {
    use electrum_client::Error as E;
    match e {
        E::IOError(_) | E::SharedIOError(_) => true,
        E::AllAttemptsErrored(errors) => errors.iter().any(is_transport_error),
        _ => false,
    }
}

/// rustls needs a process-wide crypto provider before the first TLS handshake.
fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

fn parse_verbose_tx(txid: &str, value: &Value) -> RawTransaction {
    let outputs = value.get("vout").and_then(Value::as_array).map(|vout| {
        vout.iter()
            .filter_map(|o| {
                Some(TxOutput {
                    n: o.get("n")?.as_u64()? as u32,
                    value_sat: (o.get("value")?.as_f64()? * 100_000_000.0).round() as u64,
                    script_pubkey: o.get("scriptPubKey")?.get("hex")?.as_str()?.to_string(),
                })
            })
            .collect()
    });
    RawTransaction {
        txid: txid.to_string(),
        hex: value.get("hex").and_then(Value::as_str).map(str::to_string),
        confirmations: value.get("confirmations").and_then(Value::as_u64).map(|c| c as u32),
        outputs,
    }
}

/// `server.peers.subscribe` entries: `[ip, host, ["v1.4", "s50002", "t50001"]]`.
fn parse_peer(entry: &Value) -> Option<ElectrumPeer> {
    let host = entry.get(1)?.as_str()?.to_string();
    let features = entry.get(2)?.as_array()?;
    let port = |prefix: char| {
        features.iter().filter_map(Value::as_str).find_map(|f| f.strip_prefix(prefix)?.parse::<u16>().ok())
    };
    let (ssl, tcp) = (port('s'), port('t'));
    let protocol = if ssl.is_some() { ElectrumProtocol::Ssl } else { ElectrumProtocol::Tcp };
    (ssl.is_some() || tcp.is_some()).then_some(ElectrumPeer { host, ssl, tcp, protocol })
}

#[async_trait]
impl ChainBackend for ElectrumBackend {
    async fn connect(&self, peers: &[ElectrumPeer], network: Network) -> Result<ElectrumPeer> {
        install_crypto_provider();
        let mut last_error = String::from("no peers");
        for peer in peers {
            let url = peer.url()?;
            let config = ConfigBuilder::new().timeout(Some(self.timeout_secs)).retry(0).build();
            let connect_url = url.clone();
            match tokio::task::spawn_blocking(move || Client::from_config(&connect_url, config)).await {
                Ok(Ok(client)) => {
                    info!(%url, network = %network, "electrum connected");
                    *self.client.write().unwrap_or_else(|p| p.into_inner()) = Some(Arc::new(client));
                    *self.peer.write().unwrap_or_else(|p| p.into_inner()) = Some(peer.clone());
                    return Ok(peer.clone());
                }
                Ok(Err(e)) => {
                    warn!(%url, error = %e, "electrum peer unreachable");
                    last_error = e.to_string();
                }
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(Error::Connectivity(last_error))
    }

    async fn connected_peer(&self) -> Option<ElectrumPeer> {
        self.peer.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    async fn peers(&self) -> Result<Vec<ElectrumPeer>> {
        let value = self.blocking(|c| c.raw_call("server.peers.subscribe", Vec::<Param>::new())).await?;
        Ok(value.as_array().map(|a| a.iter().filter_map(parse_peer).collect()).unwrap_or_default())
    }

    async fn get_header(&self, height: u32) -> Result<RawHeader> {
        let raw = self.blocking(move |c| c.block_header_raw(height as usize)).await?;
        Ok(RawHeader { height, hex: hex::encode(raw) })
    }

    async fn subscribe_headers(&self) -> Result<RawHeader> {
        let n = self.blocking(|c| c.block_headers_subscribe_raw()).await?;
        Ok(RawHeader { height: n.height as u32, hex: hex::encode(n.header) })
    }

    async fn poll_headers(&self) -> Result<Vec<RawHeader>> {
        self.blocking(|c| {
            c.ping()?;
            let mut headers = Vec::new();
            while let Some(n) = c.block_headers_pop_raw()? {
                headers.push(RawHeader { height: n.height as u32, hex: hex::encode(n.header) });
            }
            Ok(headers)
        })
        .await
    }

    async fn subscribe_script(&self, script: &ScriptBuf) -> Result<Option<String>> {
        let owned = script.clone();
        let status = self.blocking(move |c| c.script_subscribe(&owned)).await?;
        Ok(status.map(|s| hex::encode(*s)))
    }

    async fn poll_script(&self, script: &ScriptBuf) -> Result<bool> {
        let owned = script.clone();
        let status = self.blocking(move |c| c.script_pop(&owned)).await?;
        Ok(status.is_some())
    }

    async fn script_history(&self, scripts: &[ScriptBuf]) -> Result<Vec<Vec<TxHistoryItem>>> {
        let owned = scripts.to_vec();
        self.blocking(move |c| {
            owned
                .iter()
                .map(|s| {
                    c.script_get_history(s).map(|items| {
                        items.into_iter().map(|h| TxHistoryItem { txid: h.tx_hash.to_string(), height: h.height }).collect()
                    })
                })
                .collect()
        })
        .await
    }

    async fn transaction_merkle(&self, txid: &str, height: u32) -> Result<MerklePosition> {
        let txid = Txid::from_str(txid).map_err(|e| Error::Decode(format!("txid: {e}")))?;
        let res = self.blocking(move |c| c.transaction_get_merkle(&txid, height as usize)).await?;
        Ok(MerklePosition { block_height: res.block_height as u32, pos: res.pos as u32 })
    }

    async fn get_transactions(&self, txids: &[String]) -> Result<Vec<RawTransaction>> {
        let mut out = Vec::with_capacity(txids.len());
        for txid in txids {
            let params = vec![Param::String(txid.clone()), Param::Bool(true)];
            match self.blocking(move |c| c.raw_call("blockchain.transaction.get", params)).await {
                Ok(value) => out.push(parse_verbose_tx(txid, &value)),
                Err(e) => {
                    debug!(%txid, error = %e, "verbose transaction unavailable");
                    out.push(RawTransaction::missing(txid));
                }
            }
        }
        Ok(out)
    }

    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String> {
        let bytes = hex::decode(raw_tx_hex).map_err(|e| Error::Decode(format!("transaction hex: {e}")))?;
        let txid = self.blocking(move |c| c.transaction_broadcast_raw(&bytes)).await?;
        Ok(txid.to_string())
    }

    async fn estimate_fee(&self, target_blocks: u32) -> Result<f64> {
        self.blocking(move |c| c.estimate_fee(target_blocks as usize)).await
    }
}
