//! Error - one error type for every component
//!
//! Each variant belongs to a taxonomy bucket ([`ErrorKind`]) that the UI maps
//! to its own messaging. Operations that the UI treats as "best effort"
//! (transaction data lookups, merkle positions) do not fail; they return
//! empty values instead.

use crate::payment::PaymentFailureReason;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Chain backend unreachable: {0}")]
    Connectivity(String),

    #[error("Node setup failed: {0}")]
    Setup(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Insufficient liquidity: requested {requested_sat} sat, available {available_sat} sat, short by {shortfall_sat} sat")]
    Liquidity { requested_sat: u64, available_sat: u64, shortfall_sat: u64 },

    #[error("Amount {amount_sat} sat is outside the allowed range {min_sat}..={max_sat} sat")]
    LnurlLimit { amount_sat: u64, min_sat: u64, max_sat: u64 },

    #[error("LNURL service error: {0}")]
    Lnurl(String),

    #[error("{}", .0.message())]
    PaymentSend(PaymentFailureReason),

    #[error("Secure storage verification failed for '{key}'")]
    StorageIntegrity { key: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Derivation failed: {0}")]
    Derivation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Node error: {0}")]
    Node(String),

    #[error("Chain error: {0}")]
    Chain(String),
}

/// Coarse error buckets surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    Setup,
    Decode,
    Liquidity,
    PaymentSend,
    StorageIntegrity,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connectivity(_) | Error::Timeout(_) => ErrorKind::Connectivity,
            Error::Setup(_) => ErrorKind::Setup,
            Error::Decode(_) | Error::Unsupported(_) => ErrorKind::Decode,
            Error::Liquidity { .. } | Error::LnurlLimit { .. } => ErrorKind::Liquidity,
            Error::PaymentSend(_) | Error::Lnurl(_) => ErrorKind::PaymentSend,
            Error::StorageIntegrity { .. } => ErrorKind::StorageIntegrity,
            Error::Storage(_)
            | Error::Derivation(_)
            | Error::InvalidState(_)
            | Error::Node(_)
            | Error::Chain(_) => ErrorKind::Internal,
        }
    }

    /// Build a liquidity error for `requested` against `available`.
    pub fn liquidity(requested_sat: u64, available_sat: u64) -> Self {
        Error::Liquidity { requested_sat, available_sat, shortfall_sat: requested_sat.saturating_sub(available_sat) }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self { Error::Decode(e.to_string()) }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self { Error::Storage(e.to_string()) }
}
