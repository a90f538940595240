//! TOML configuration file parsing.
//!
//! Defines the structure of the configuration file with serde.

use std::path::Path;

use serde::Deserialize;

use super::ConfigError;

/// Root configuration structure from TOML file.
///
/// All fields are optional to allow partial configuration
/// that can be merged with CLI arguments and environment variables.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// API connection section
    #[serde(default)]
    pub api: ApiSection,

    /// Retry policy section
    #[serde(default)]
    pub retry: RetrySection,

    /// Credential section
    #[serde(default)]
    pub auth: AuthSection,

    /// Webhook verification section
    #[serde(default)]
    pub webhook: WebhookSection,
}

/// API connection section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiSection {
    /// Base URL of the API
    pub base_url: Option<String>,

    /// Total request timeout in seconds
    pub timeout: Option<u64>,

    /// Connection timeout in seconds
    pub connect_timeout: Option<u64>,

    /// Skip TLS certificate verification (local testing only)
    #[serde(default)]
    pub danger_accept_invalid_certs: bool,

    /// User-Agent override
    pub user_agent: Option<String>,
}

/// Retry policy section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    /// Maximum number of retries after the first attempt
    pub max_attempts: Option<u32>,

    /// Base retry delay in milliseconds
    pub base_delay_ms: Option<u64>,
}

/// Credential section. At most one key may be set.
#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    /// Bearer token
    pub bearer_token: Option<String>,

    /// API key
    pub api_key: Option<String>,

    /// Tenant key
    pub tenant_key: Option<String>,
}

impl std::fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("AuthSection")
            .field("bearer_token", &redact(&self.bearer_token))
            .field("api_key", &redact(&self.api_key))
            .field("tenant_key", &redact(&self.tenant_key))
            .finish()
    }
}

/// Webhook verification section.
#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookSection {
    /// Shared signing secret
    pub secret: Option<String>,

    /// Replay window in seconds
    pub tolerance: Option<u64>,
}

impl std::fmt::Debug for WebhookSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSection")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl TomlConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::from)
    }
}

/// Generates a default configuration file with comments.
#[must_use]
pub fn default_config_template() -> String {
    r#"# einvoice Configuration File
#
# Every value can also be given as a command-line flag or an EINVOICE_*
# environment variable; those take precedence over this file.

[api]
# Base URL of the e-invoicing API (required for API commands)
# base_url = "https://api.example.com/v1"

# Total request timeout in seconds (default: 30)
# timeout = 30

# Connection timeout in seconds (default: 10)
# connect_timeout = 10

# Skip TLS certificate verification. Local testing only, never in production.
# danger_accept_invalid_certs = false

# User-Agent override (default: einvoice-sdk/<version>)
# user_agent = "my-erp/1.0"

[retry]
# Maximum number of retries after the first attempt (default: 3)
# max_attempts = 3

# Base retry delay in milliseconds, doubled per retry (default: 100)
# base_delay_ms = 100

[auth]
# Set at most one credential
# bearer_token = "your-token-here"
# api_key = "your-api-key"
# tenant_key = "your-tenant-key"

[webhook]
# Shared secret used to sign webhook deliveries
# secret = "whsec_..."

# Accepted clock skew for signature timestamps in seconds (default: 300)
# tolerance = 300
"#
    .to_string()
}
