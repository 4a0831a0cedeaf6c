use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a send failed, as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentFailureReason {
    FailSending,
    FailRouting,
    FailPartial,
    RetriesExhausted,
    RecipientRejected,
    PaymentExpired,
    Unknown(String),
}

impl PaymentFailureReason {
    pub fn from_code(code: &str) -> Self {
        match code {
            "fail_sending" => Self::FailSending,
            "fail_routing" => Self::FailRouting,
            "fail_partial" => Self::FailPartial,
            "retries_exhausted" => Self::RetriesExhausted,
            "recipient_rejected" => Self::RecipientRejected,
            "payment_expired" => Self::PaymentExpired,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// User-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            Self::FailSending => "Payment could not be sent, try again",
            Self::FailRouting => "No route to the payee was found",
            Self::FailPartial => "Payment partially failed, remaining parts are being returned",
            Self::RetriesExhausted => "Payment failed after several attempts",
            Self::RecipientRejected => "The recipient rejected the payment",
            Self::PaymentExpired => "The invoice expired before the payment completed",
            Self::Unknown(_) => "Could not reach payee, funds are safe",
        }
    }
}

impl fmt::Display for PaymentFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.message()) }
}
