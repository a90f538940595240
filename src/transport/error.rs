//! Error types for transport operations.

use std::collections::BTreeMap;

use http::{HeaderMap, StatusCode};
use serde_json::Value;
use thiserror::Error;

/// Error type for a single HTTP attempt.
///
/// Describes what went wrong without dictating recovery strategy.
/// These errors mean no response was obtained.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Network connection failed.
    ///
    /// This includes DNS resolution failures, connection refused,
    /// TLS handshake failures and other network-level errors.
    #[error("Connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Request timed out.
    ///
    /// Either the server did not respond within the configured timeout or
    /// the caller's overall call deadline elapsed.
    #[error("Request timed out")]
    Timeout,

    /// The provided URL is invalid.
    ///
    /// This typically indicates a configuration error rather than
    /// a transient failure.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Rate-limit metadata parsed from a 429 response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// `X-RateLimit-Limit`: requests allowed per window.
    pub limit: Option<u64>,
    /// `X-RateLimit-Remaining`: requests left in the current window.
    pub remaining: Option<u64>,
    /// `X-RateLimit-Reset`: when the window resets, as sent by the server.
    pub reset: Option<u64>,
    /// `Retry-After` in seconds, when sent as a number.
    pub retry_after: Option<u64>,
}

impl RateLimitInfo {
    /// Header carrying the request quota.
    pub const LIMIT_HEADER: &'static str = "x-ratelimit-limit";
    /// Header carrying the remaining quota.
    pub const REMAINING_HEADER: &'static str = "x-ratelimit-remaining";
    /// Header carrying the reset time.
    pub const RESET_HEADER: &'static str = "x-ratelimit-reset";

    /// Extracts rate-limit metadata from response headers.
    ///
    /// Missing or non-numeric headers are left as `None`.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            limit: header_u64(headers, Self::LIMIT_HEADER),
            remaining: header_u64(headers, Self::REMAINING_HEADER),
            reset: header_u64(headers, Self::RESET_HEADER),
            retry_after: header_u64(headers, http::header::RETRY_AFTER.as_str()),
        }
    }
}

impl std::fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |v: Option<u64>| v.map_or_else(|| "?".to_string(), |v| v.to_string());
        write!(
            f,
            "limit: {}, remaining: {}, reset: {}, retry after: {}s",
            show(self.limit),
            show(self.remaining),
            show(self.reset),
            show(self.retry_after),
        )
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Error returned by [`ApiClient`](super::ApiClient) calls.
///
/// Exactly one of these crosses the public boundary per failed call, after
/// all retries are exhausted. Every HTTP-level variant carries the parsed
/// response body (an empty object when the body was not JSON).
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was obtained, even after retrying.
    #[error("Transport error: {0}")]
    Transport(#[from] HttpError),

    /// The server rejected the credentials (HTTP 401).
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Server-provided message, or the canonical reason
        message: String,
        /// Parsed response body
        body: Value,
    },

    /// The server rejected the request payload (HTTP 422).
    #[error("Validation failed: {message}")]
    Validation {
        /// Server-provided message, or the canonical reason
        message: String,
        /// Field name to messages, from the body's `errors` key
        errors: BTreeMap<String, Vec<String>>,
        /// Parsed response body
        body: Value,
    },

    /// The server throttled the request (HTTP 429).
    #[error("Rate limit exceeded ({info})")]
    RateLimited {
        /// Metadata from the rate-limit headers
        info: RateLimitInfo,
        /// Parsed response body
        body: Value,
    },

    /// Any other non-2xx response.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: StatusCode,
        /// Vendor error code, if present in the body
        code: Option<String>,
        /// Server-provided message, or the canonical reason
        message: String,
        /// Parsed response body
        body: Value,
    },

    /// The request path could not be joined onto the base URL.
    #[error("Invalid request path '{path}': {reason}")]
    InvalidPath {
        /// The offending path
        path: String,
        /// Reason for invalidity
        reason: String,
    },

    /// The active credential cannot be sent as a header value.
    #[error("Credential is not a valid header value: {0}")]
    InvalidCredential(#[source] http::header::InvalidHeaderValue),

    /// The request body could not be serialized to JSON.
    #[error("Failed to serialize request body: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A 2xx body did not match the requested type.
    #[error("Failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),
}

impl ApiError {
    /// Classifies a non-2xx response.
    ///
    /// The body is parsed as JSON; anything unparseable becomes an empty
    /// object so callers can always inspect it.
    #[must_use]
    pub fn from_response(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Self {
        let body = parse_body(body);
        let message = extract_message(&body).unwrap_or_else(|| default_message(status));

        match status {
            StatusCode::UNAUTHORIZED => Self::Authentication { message, body },
            StatusCode::UNPROCESSABLE_ENTITY => Self::Validation {
                message,
                errors: extract_field_errors(&body),
                body,
            },
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited {
                info: RateLimitInfo::from_headers(headers),
                body,
            },
            _ => Self::Api {
                status,
                code: extract_code(&body),
                message,
                body,
            },
        }
    }

    /// Returns the HTTP status this error was built from, if any.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Authentication { .. } => Some(StatusCode::UNAUTHORIZED),
            Self::Validation { .. } => Some(StatusCode::UNPROCESSABLE_ENTITY),
            Self::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            Self::Api { status, .. } => Some(*status),
            Self::Transport(_)
            | Self::InvalidPath { .. }
            | Self::InvalidCredential(_)
            | Self::Serialize(_)
            | Self::Decode(_) => None,
        }
    }

    /// Returns the parsed response body, if this error came from a response.
    #[must_use]
    pub const fn body(&self) -> Option<&Value> {
        match self {
            Self::Authentication { body, .. }
            | Self::Validation { body, .. }
            | Self::RateLimited { body, .. }
            | Self::Api { body, .. } => Some(body),
            Self::Transport(_)
            | Self::InvalidPath { .. }
            | Self::InvalidCredential(_)
            | Self::Serialize(_)
            | Self::Decode(_) => None,
        }
    }
}

/// Parses a body as JSON, falling back to an empty object.
pub(crate) fn parse_body(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return empty_object();
    }
    serde_json::from_slice(body).unwrap_or_else(|_| empty_object())
}

pub(crate) fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn default_message(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map_or_else(|| format!("HTTP {}", status.as_u16()), ToString::to_string)
}

/// Reads `message`, `error.message` or a string `error`.
fn extract_message(body: &Value) -> Option<String> {
    if let Some(message) = body.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    match body.get("error")? {
        Value::String(s) => Some(s.clone()),
        nested => nested
            .get("message")
            .and_then(Value::as_str)
            .map(ToString::to_string),
    }
}

/// Reads `code`, `error_code` or `error.code`; numeric codes are stringified.
fn extract_code(body: &Value) -> Option<String> {
    body.get("code")
        .or_else(|| body.get("error_code"))
        .or_else(|| body.get("error").and_then(|e| e.get("code")))
        .and_then(scalar_to_string)
}

fn extract_field_errors(body: &Value) -> BTreeMap<String, Vec<String>> {
    let Some(Value::Object(errors)) = body.get("errors") else {
        return BTreeMap::new();
    };

    errors
        .iter()
        .map(|(field, messages)| {
            let messages = match messages {
                Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
                other => scalar_to_string(other).into_iter().collect(),
            };
            (field.clone(), messages)
        })
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
