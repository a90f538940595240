//! Authentication credentials.

use std::fmt;

use http::header::{AUTHORIZATION, HeaderName, HeaderValue, InvalidHeaderValue};

/// Header used for API-key authentication.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header used for tenant-key authentication.
pub const TENANT_KEY_HEADER: &str = "x-tenant-key";

/// The single active credential of an [`ApiClient`](super::ApiClient).
///
/// Being an enum, at most one mode is ever active; replacing the credential
/// discards the previous one.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// `X-API-Key: <key>`
    ApiKey(String),
    /// `X-Tenant-Key: <key>`
    TenantKey(String),
}

impl Credential {
    /// Returns the header name this credential is sent under.
    #[must_use]
    pub fn header_name(&self) -> HeaderName {
        match self {
            Self::Bearer(_) => AUTHORIZATION,
            Self::ApiKey(_) => HeaderName::from_static(API_KEY_HEADER),
            Self::TenantKey(_) => HeaderName::from_static(TENANT_KEY_HEADER),
        }
    }

    /// Builds the header value, marked sensitive so it is redacted from
    /// `Debug` output of header maps.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret contains characters that are not
    /// allowed in header values (e.g. newlines).
    pub fn header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut value = match self {
            Self::Bearer(token) => HeaderValue::try_from(format!("Bearer {token}"))?,
            Self::ApiKey(key) | Self::TenantKey(key) => HeaderValue::try_from(key.as_str())?,
        };
        value.set_sensitive(true);
        Ok(value)
    }

    /// Short name of the authentication mode, safe to log.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bearer(_) => "bearer",
            Self::ApiKey(_) => "api_key",
            Self::TenantKey(_) => "tenant_key",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential::{}(<redacted>)", self.kind())
    }
}
