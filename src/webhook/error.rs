//! Webhook verification errors.

use thiserror::Error;

/// Why a webhook delivery was rejected.
///
/// Every variant is terminal: retrying verification of the same delivery
/// cannot succeed.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// The signature header is missing, malformed or lacks `t`/`v1`.
    #[error("Invalid signature header: {0}")]
    InvalidFormat(String),

    /// The timestamp is older than the tolerance window.
    #[error("Signature timestamp {timestamp} is older than {tolerance}s (now {now})")]
    Expired {
        timestamp: i64,
        now: i64,
        tolerance: u64,
    },

    /// The timestamp lies further in the future than the tolerance window.
    #[error("Signature timestamp {timestamp} is more than {tolerance}s in the future (now {now})")]
    FutureTimestamp {
        timestamp: i64,
        now: i64,
        tolerance: u64,
    },

    /// The digest does not match the payload.
    #[error("Signature does not match payload")]
    InvalidSignature,

    /// The payload is authentic but not valid JSON (or not the expected shape).
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),
}

impl SignatureError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat(reason.into())
    }
}
