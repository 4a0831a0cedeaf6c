use super::OpenChannelRequest;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelDecision {
    Accept,
    Reject(String),
}

/// Decides whether an inbound channel (zero-conf included) is accepted.
pub trait ChannelAcceptPolicy: Send + Sync {
    fn evaluate(&self, request: &OpenChannelRequest) -> ChannelDecision;
}

/// Accept every inbound channel request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ChannelAcceptPolicy for AcceptAll {
    fn evaluate(&self, _request: &OpenChannelRequest) -> ChannelDecision { ChannelDecision::Accept }
}

/// Accept only from known counterparties, optionally capping the funding size.
#[derive(Debug, Clone, Default)]
pub struct TrustedPeers {
    peers: HashSet<String>,
    max_funding_sat: Option<u64>,
}

impl TrustedPeers {
    pub fn new<I, S>(peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { peers: peers.into_iter().map(|p| p.into().to_ascii_lowercase()).collect(), max_funding_sat: None }
    }

    pub fn with_max_funding(mut self, sat: u64) -> Self { self.max_funding_sat = Some(sat); self }
}

impl ChannelAcceptPolicy for TrustedPeers {
    fn evaluate(&self, request: &OpenChannelRequest) -> ChannelDecision {
        if !self.peers.contains(&request.counterparty_node_id.to_ascii_lowercase()) {
            return ChannelDecision::Reject(format!("{} is not a trusted peer", request.counterparty_node_id));
        }
        match self.max_funding_sat {
            Some(max) if request.funding_sat > max => {
                ChannelDecision::Reject(format!("funding {} sat above limit {max} sat", request.funding_sat))
            }
            _ => ChannelDecision::Accept,
        }
    }
}
