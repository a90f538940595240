//! Validated configuration after merging CLI, environment and TOML sources.
//!
//! This module contains the final, validated configuration that is used
//! by the application. All validation is performed during construction.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::transport::{ClientConfig, Credential, RetryPolicy};

use super::cli::Cli;
use super::defaults;
use super::error::{ConfigError, field};
use super::toml::TomlConfig;

/// Fully validated configuration ready for use by the application.
///
/// Settings needed only by some commands (the base URL, the webhook secret)
/// may be absent; [`ValidatedConfig::client_config`] and
/// [`ValidatedConfig::webhook_secret`] report them as missing on demand.
///
/// # Construction
///
/// Use [`ValidatedConfig::from_raw`] to create from CLI args and optional TOML config.
/// The function validates all inputs and returns errors for invalid configurations.
pub struct ValidatedConfig {
    /// API base URL
    pub base_url: Option<Url>,

    /// Total request timeout
    pub timeout: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Retry policy for API calls
    pub retry_policy: RetryPolicy,

    /// Skip TLS certificate verification
    pub danger_accept_invalid_certs: bool,

    /// User-Agent override
    pub user_agent: Option<String>,

    /// The active credential, if any
    pub credential: Option<Credential>,

    /// Shared webhook signing secret
    pub webhook_secret: Option<String>,

    /// Replay window for webhook signatures
    pub webhook_tolerance: Duration,

    /// Verbose logging enabled
    pub verbose: bool,

    /// TOML file the settings were read from, if any
    pub config_file: Option<PathBuf>,
}

impl fmt::Display for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base_url = self
            .base_url
            .as_ref()
            .map_or_else(|| "none".to_string(), ToString::to_string);
        let credential = self.credential.as_ref().map_or("none", Credential::kind);

        write!(
            f,
            "Config {{ base_url: {}, timeout: {}s, connect_timeout: {}s, retry: {}x/{}ms, \
             insecure: {}, credential: {}, webhook_secret: {}, webhook_tolerance: {}s }}",
            base_url,
            self.timeout.as_secs(),
            self.connect_timeout.as_secs(),
            self.retry_policy.max_retries,
            self.retry_policy.base_delay.as_millis(),
            self.danger_accept_invalid_certs,
            credential,
            if self.webhook_secret.is_some() { "set" } else { "none" },
            self.webhook_tolerance.as_secs(),
        )
    }
}

impl fmt::Debug for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("retry_policy", &self.retry_policy)
            .field("danger_accept_invalid_certs", &self.danger_accept_invalid_certs)
            .field("user_agent", &self.user_agent)
            .field("credential", &self.credential)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("webhook_tolerance", &self.webhook_tolerance)
            .field("verbose", &self.verbose)
            .field("config_file", &self.config_file)
            .finish()
    }
}

impl ValidatedConfig {
    /// Creates a validated configuration from CLI arguments and optional TOML config.
    ///
    /// CLI arguments (and their environment variables) take precedence over
    /// TOML config values, which take precedence over built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The base URL is invalid or not http(s)
    /// - A timeout or the webhook tolerance is zero
    /// - More than one credential is set at the same level
    pub fn from_raw(cli: &Cli, toml: Option<&TomlConfig>) -> Result<Self, ConfigError> {
        let base_url = Self::resolve_base_url(cli, toml)?;

        let timeout = resolve_secs(
            "timeout",
            cli.timeout.or_else(|| toml.and_then(|t| t.api.timeout)),
            defaults::TIMEOUT_SECS,
        )?;

        let connect_timeout = resolve_secs(
            "connect_timeout",
            cli.connect_timeout
                .or_else(|| toml.and_then(|t| t.api.connect_timeout)),
            defaults::CONNECT_TIMEOUT_SECS,
        )?;

        let retry_policy = Self::build_retry_policy(cli, toml);

        // Flags only enable: true in either source wins
        let danger_accept_invalid_certs =
            cli.insecure || toml.is_some_and(|t| t.api.danger_accept_invalid_certs);

        let user_agent = toml.and_then(|t| t.api.user_agent.clone());

        let credential = Self::resolve_credential(cli, toml)?;

        let webhook_secret = cli
            .webhook_secret
            .clone()
            .or_else(|| toml.and_then(|t| t.webhook.secret.clone()))
            .filter(|secret| !secret.is_empty());

        let webhook_tolerance = resolve_secs(
            "webhook.tolerance",
            toml.and_then(|t| t.webhook.tolerance),
            defaults::WEBHOOK_TOLERANCE_SECS,
        )?;

        Ok(Self {
            base_url,
            timeout,
            connect_timeout,
            retry_policy,
            danger_accept_invalid_certs,
            user_agent,
            credential,
            webhook_secret,
            webhook_tolerance,
            verbose: cli.verbose,
            config_file: None,
        })
    }

    /// Loads and merges configuration from CLI and a config file.
    ///
    /// If `cli.config` is set, that file must exist. Otherwise the default
    /// config path is used when a file is present there.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file cannot be read or parsed
    /// - The merged configuration is invalid
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let path = cli
            .config
            .clone()
            .or_else(|| defaults::config_path().filter(|p| p.is_file()));

        let toml = path.as_deref().map(TomlConfig::load).transpose()?;

        let mut config = Self::from_raw(cli, toml.as_ref())?;
        config.config_file = path;
        Ok(config)
    }

    /// Builds the transport configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequired`] if no base URL is configured.
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let base_url = self.base_url.as_ref().ok_or_else(|| {
            ConfigError::missing(
                field::BASE_URL,
                "Use --base-url, set EINVOICE_BASE_URL, or set api.base_url in config file",
            )
        })?;

        let mut config = ClientConfig::new(base_url.as_str())
            .with_timeout(self.timeout)
            .with_connect_timeout(self.connect_timeout)
            .with_retry(self.retry_policy.clone())
            .danger_accept_invalid_certs(self.danger_accept_invalid_certs);
        if let Some(ref user_agent) = self.user_agent {
            config = config.with_user_agent(user_agent.clone());
        }

        Ok(config)
    }

    /// Returns the webhook secret.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequired`] if no secret is configured.
    pub fn webhook_secret(&self) -> Result<&str, ConfigError> {
        self.webhook_secret.as_deref().ok_or_else(|| {
            ConfigError::missing(
                field::WEBHOOK_SECRET,
                "Use --webhook-secret, set EINVOICE_WEBHOOK_SECRET, or set webhook.secret in config file",
            )
        })
    }

    fn resolve_base_url(cli: &Cli, toml: Option<&TomlConfig>) -> Result<Option<Url>, ConfigError> {
        // CLI takes precedence
        let Some(url_str) = cli
            .base_url
            .as_deref()
            .or_else(|| toml.and_then(|t| t.api.base_url.as_deref()))
        else {
            return Ok(None);
        };

        let invalid = |reason: String| ConfigError::InvalidUrl {
            url: url_str.to_string(),
            reason,
        };

        let url = Url::parse(url_str).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.cannot_be_a_base() {
            return Err(invalid("cannot be used as a base URL".to_string()));
        }

        Ok(Some(url))
    }

    fn build_retry_policy(cli: &Cli, toml: Option<&TomlConfig>) -> RetryPolicy {
        let retry = toml.map(|t| &t.retry);

        // Priority: CLI explicit > TOML > default
        let max_retries = cli
            .retry_max
            .or_else(|| retry.and_then(|r| r.max_attempts))
            .unwrap_or(defaults::RETRY_MAX_ATTEMPTS);

        let base_delay_ms = cli
            .retry_delay_ms
            .or_else(|| retry.and_then(|r| r.base_delay_ms))
            .unwrap_or(defaults::RETRY_BASE_DELAY_MS);

        RetryPolicy::new()
            .with_max_retries(max_retries)
            .with_base_delay(Duration::from_millis(base_delay_ms))
    }

    /// CLI credentials replace TOML credentials entirely; within one level
    /// at most one may be set.
    fn resolve_credential(
        cli: &Cli,
        toml: Option<&TomlConfig>,
    ) -> Result<Option<Credential>, ConfigError> {
        let from_cli = single_credential(
            cli.bearer_token.as_deref(),
            cli.api_key.as_deref(),
            cli.tenant_key.as_deref(),
        )?;
        if from_cli.is_some() {
            return Ok(from_cli);
        }

        match toml {
            Some(t) => single_credential(
                t.auth.bearer_token.as_deref(),
                t.auth.api_key.as_deref(),
                t.auth.tenant_key.as_deref(),
            ),
            None => Ok(None),
        }
    }
}

/// Writes the default configuration template to a file, creating parent
/// directories as needed.
///
/// # Errors
///
/// Returns an error if the file exists and `force` is false, or if it
/// cannot be written.
pub fn write_default_config(path: &Path, force: bool) -> Result<(), ConfigError> {
    if path.exists() && !force {
        return Err(ConfigError::FileExists {
            path: path.to_path_buf(),
        });
    }

    let write_error = |source: std::io::Error| ConfigError::FileWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }

    let template = super::toml::default_config_template();
    std::fs::write(path, template).map_err(write_error)
}

/// Path `init` writes to when no output is given.
#[must_use]
pub fn default_output_path() -> PathBuf {
    defaults::config_path().unwrap_or_else(|| PathBuf::from(defaults::CONFIG_FILE_NAME))
}

// Helper functions

fn resolve_secs(
    field: &'static str,
    value: Option<u64>,
    default: u64,
) -> Result<Duration, ConfigError> {
    let seconds = value.unwrap_or(default);

    if seconds == 0 {
        return Err(ConfigError::InvalidDuration {
            field,
            reason: "must be greater than 0".to_string(),
        });
    }

    Ok(Duration::from_secs(seconds))
}

fn single_credential(
    bearer_token: Option<&str>,
    api_key: Option<&str>,
    tenant_key: Option<&str>,
) -> Result<Option<Credential>, ConfigError> {
    let candidates = [
        ("bearer_token", bearer_token.map(|v| Credential::Bearer(v.to_string()))),
        ("api_key", api_key.map(|v| Credential::ApiKey(v.to_string()))),
        ("tenant_key", tenant_key.map(|v| Credential::TenantKey(v.to_string()))),
    ];

    let mut set = candidates
        .into_iter()
        .filter_map(|(name, credential)| credential.map(|c| (name, c)));

    let first = set.next();
    if let (Some((first, _)), Some((second, _))) = (first.as_ref(), set.next()) {
        return Err(ConfigError::ConflictingCredentials {
            first: *first,
            second,
        });
    }

    Ok(first.map(|(_, credential)| credential))
}
