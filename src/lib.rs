//! einvoice-sdk: client SDK for an e-invoicing and e-signature REST API.
//!
//! The crate provides two independent building blocks:
//!
//! - [`transport`]: a JSON-over-HTTPS client with authentication headers,
//!   retry/backoff and typed error classification.
//! - [`webhook`]: HMAC-SHA256 verification of inbound webhook deliveries.
//!
//! [`config`] turns a TOML file plus CLI/environment overrides into the
//! plain constructor parameters both components take.

pub mod config;
pub mod time;
pub mod transport;
pub mod webhook;
