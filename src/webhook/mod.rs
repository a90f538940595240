//! Webhook signature verification.
//!
//! Deliveries carry `X-Einvoice-Signature: t=<unix_ts>,v1=<hex>`, where the
//! digest is HMAC-SHA256 over `"{t}.{payload}"` keyed with the shared
//! secret. [`WebhookVerifier`] checks the digest in constant time and
//! rejects timestamps outside a replay window.

mod error;
mod signature;
mod verifier;

#[cfg(test)]
mod verifier_tests;

pub use error::SignatureError;
pub use signature::SignatureHeader;
pub use verifier::{DEFAULT_TOLERANCE, SIGNATURE_HEADER, WebhookVerifier};
