//! The `t=<unix_ts>,v1=<hex>` signature header.

use std::fmt;
use std::str::FromStr;

use super::SignatureError;

/// A parsed webhook signature header.
///
/// Pairs are separated by `,` and split on the first `=`. Whitespace around
/// pairs, keys and values is ignored, as are unknown keys and pairs without
/// `=`. When a key repeats, the last occurrence wins.
///
/// ```
/// use einvoice_sdk::webhook::SignatureHeader;
///
/// let header: SignatureHeader = " v1=abcd , t=1700000000, v0=old".parse().unwrap();
/// assert_eq!(header.timestamp, 1_700_000_000);
/// assert_eq!(header.signature, "abcd");
/// assert_eq!(header.to_string(), "t=1700000000,v1=abcd");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp the signature was issued at.
    pub timestamp: i64,
    /// Hex-encoded HMAC-SHA256 digest.
    pub signature: String,
}

impl FromStr for SignatureHeader {
    type Err = SignatureError;

    fn from_str(header: &str) -> Result<Self, Self::Err> {
        let mut timestamp = None;
        let mut signature = None;

        for pair in header.split(',') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => timestamp = Some(value.trim()),
                "v1" => signature = Some(value.trim()),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| SignatureError::format("missing 't'"))?;
        let signature = signature.ok_or_else(|| SignatureError::format("missing 'v1'"))?;

        let timestamp = timestamp
            .parse::<i64>()
            .map_err(|_| SignatureError::format(format!("'t' is not an integer: '{timestamp}'")))?;

        if signature.is_empty() {
            return Err(SignatureError::format("empty 'v1'"));
        }

        Ok(Self {
            timestamp,
            signature: signature.to_string(),
        })
    }
}

impl fmt::Display for SignatureHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={},v1={}", self.timestamp, self.signature)
    }
}
