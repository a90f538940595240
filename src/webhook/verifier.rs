//! HMAC-SHA256 verification of webhook deliveries.

use std::fmt;
use std::time::Duration;

use hmac::{Hmac, Mac};
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::Sha256;

use crate::time::{Clock, SystemClock};

use super::{SignatureError, SignatureHeader};

type HmacSha256 = Hmac<Sha256>;

/// Replay window applied by [`WebhookVerifier::verify`].
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Header carrying the signature on webhook deliveries.
pub const SIGNATURE_HEADER: &str = "x-einvoice-signature";

/// Verifies (and, for fixtures, issues) webhook signatures for one secret.
///
/// The signed message is `"{t}.{payload}"`; the digest is compared in
/// constant time. A verifier holds no mutable state and can be shared
/// freely between handlers.
///
/// # Example
///
/// ```
/// use einvoice_sdk::webhook::WebhookVerifier;
///
/// let verifier = WebhookVerifier::new("whsec_test");
/// let payload = r#"{"event":"invoice.sent"}"#;
/// let header = verifier.generate_signature(payload);
///
/// let event = verifier.verify(payload, &header).unwrap();
/// assert_eq!(event["event"], "invoice.sent");
/// ```
#[derive(Clone)]
pub struct WebhookVerifier<C = SystemClock> {
    mac: HmacSha256,
    clock: C,
}

impl WebhookVerifier<SystemClock> {
    /// Creates a verifier for `secret`.
    ///
    /// # Panics
    ///
    /// Does not panic in practice: HMAC accepts keys of any length.
    #[must_use]
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mac = HmacSha256::new_from_slice(secret.as_ref())
            .expect("HMAC can take key of any size");
        Self {
            mac,
            clock: SystemClock,
        }
    }
}

impl<C> WebhookVerifier<C> {
    /// Replaces the clock used for replay checks and generated timestamps.
    #[must_use]
    pub fn with_clock<C2>(self, clock: C2) -> WebhookVerifier<C2> {
        WebhookVerifier {
            mac: self.mac,
            clock,
        }
    }

    /// Produces a signature header for `payload` issued at `timestamp`.
    #[must_use]
    pub fn generate_signature_at(&self, payload: impl AsRef<[u8]>, timestamp: i64) -> String {
        let digest = self.signed(payload.as_ref(), timestamp).finalize().into_bytes();
        SignatureHeader {
            timestamp,
            signature: hex::encode(digest),
        }
        .to_string()
    }

    /// A MAC primed with `"{timestamp}.{payload}"`.
    fn signed(&self, payload: &[u8], timestamp: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac
    }
}

impl<C: Clock> WebhookVerifier<C> {
    /// Verifies `payload` against `header` with the default 300 s window and
    /// returns the decoded JSON.
    ///
    /// # Errors
    ///
    /// See [`WebhookVerifier::verify_with_tolerance`].
    pub fn verify(&self, payload: impl AsRef<[u8]>, header: &str) -> Result<Value, SignatureError> {
        self.verify_with_tolerance(payload, header, DEFAULT_TOLERANCE)
    }

    /// Verifies `payload` against `header`, accepting timestamps within
    /// `tolerance` of now. The window is counted in whole seconds; a
    /// non-zero tolerance below one second counts as one second.
    ///
    /// A zero tolerance disables replay protection; prefer
    /// [`WebhookVerifier::verify_ignoring_timestamp`] to make that explicit.
    ///
    /// # Errors
    ///
    /// - [`SignatureError::InvalidFormat`] if the header cannot be parsed
    /// - [`SignatureError::Expired`] / [`SignatureError::FutureTimestamp`]
    ///   if the timestamp is outside the window
    /// - [`SignatureError::InvalidSignature`] if the digest does not match
    /// - [`SignatureError::InvalidPayload`] if the payload is not JSON
    pub fn verify_with_tolerance(
        &self,
        payload: impl AsRef<[u8]>,
        header: &str,
        tolerance: Duration,
    ) -> Result<Value, SignatureError> {
        let payload = payload.as_ref();
        self.authenticate(payload, header, tolerance)
            .and_then(|()| serde_json::from_slice(payload).map_err(SignatureError::InvalidPayload))
            .inspect_err(|e| tracing::debug!("Rejected webhook delivery: {e}"))
    }

    /// Verifies the signature without any timestamp check.
    ///
    /// This disables replay protection: a captured delivery stays valid
    /// forever. Meant for replaying stored deliveries and for tests.
    ///
    /// # Errors
    ///
    /// As [`WebhookVerifier::verify_with_tolerance`], minus the timestamp
    /// errors.
    pub fn verify_ignoring_timestamp(
        &self,
        payload: impl AsRef<[u8]>,
        header: &str,
    ) -> Result<Value, SignatureError> {
        self.verify_with_tolerance(payload, header, Duration::ZERO)
    }

    /// Like [`WebhookVerifier::verify`], but deserializes into `T`.
    ///
    /// # Errors
    ///
    /// As [`WebhookVerifier::verify`]; a payload of the wrong shape is
    /// [`SignatureError::InvalidPayload`].
    pub fn verify_as<T: DeserializeOwned>(
        &self,
        payload: impl AsRef<[u8]>,
        header: &str,
    ) -> Result<T, SignatureError> {
        let value = self.verify(payload, header)?;
        serde_json::from_value(value).map_err(SignatureError::InvalidPayload)
    }

    /// Reads the signature from [`SIGNATURE_HEADER`] and verifies with the
    /// default window.
    ///
    /// # Errors
    ///
    /// A missing or non-ASCII header is [`SignatureError::InvalidFormat`];
    /// otherwise as [`WebhookVerifier::verify`].
    pub fn verify_headers(
        &self,
        payload: impl AsRef<[u8]>,
        headers: &HeaderMap,
    ) -> Result<Value, SignatureError> {
        let header = headers
            .get(SIGNATURE_HEADER)
            .ok_or_else(|| SignatureError::format(format!("missing {SIGNATURE_HEADER} header")))?
            .to_str()
            .map_err(|_| SignatureError::format(format!("{SIGNATURE_HEADER} is not ASCII")))?;
        self.verify(payload, header)
    }

    /// Returns whether `header` is a valid, current signature of `payload`.
    #[must_use]
    pub fn is_valid(&self, payload: impl AsRef<[u8]>, header: &str) -> bool {
        self.verify(payload, header).is_ok()
    }

    /// Produces a signature header for `payload` issued now.
    #[must_use]
    pub fn generate_signature(&self, payload: impl AsRef<[u8]>) -> String {
        self.generate_signature_at(payload, self.clock.unix_seconds())
    }

    /// Checks header format, timestamp window and digest, in that order.
    fn authenticate(
        &self,
        payload: &[u8],
        header: &str,
        tolerance: Duration,
    ) -> Result<(), SignatureError> {
        let header: SignatureHeader = header.parse()?;

        if !tolerance.is_zero() {
            // Sub-second tolerances round up to one second.
            let window = tolerance.as_secs().max(1);
            let now = self.clock.unix_seconds();
            let signed_window = i64::try_from(window).unwrap_or(i64::MAX);
            if header.timestamp < now.saturating_sub(signed_window) {
                return Err(SignatureError::Expired {
                    timestamp: header.timestamp,
                    now,
                    tolerance: window,
                });
            }
            if header.timestamp > now.saturating_add(signed_window) {
                return Err(SignatureError::FutureTimestamp {
                    timestamp: header.timestamp,
                    now,
                    tolerance: window,
                });
            }
        }

        // Undecodable hex cannot match any digest.
        let provided =
            hex::decode(&header.signature).map_err(|_| SignatureError::InvalidSignature)?;
        self.signed(payload, header.timestamp)
            .verify_slice(&provided)
            .map_err(|_| SignatureError::InvalidSignature)
    }
}

impl<C: fmt::Debug> fmt::Debug for WebhookVerifier<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"<redacted>")
            .field("clock", &self.clock)
            .finish()
    }
}
