//! CLI argument parsing using clap.
//!
//! Defines the command-line interface with all options and subcommands.
//! Connection and credential options can also be supplied through
//! `EINVOICE_*` environment variables.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::transport::Query;

use super::ConfigError;

/// einvoice: command-line client for the e-invoicing API
///
/// Sends authenticated requests to the API and signs or verifies webhook
/// deliveries.
#[derive(Debug, Parser)]
#[command(name = "einvoice")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// API base URL
    #[arg(long = "base-url", global = true, env = "EINVOICE_BASE_URL")]
    pub base_url: Option<String>,

    /// Total request timeout in seconds
    #[arg(long, global = true, env = "EINVOICE_TIMEOUT", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Connection timeout in seconds
    #[arg(
        long = "connect-timeout",
        global = true,
        env = "EINVOICE_CONNECT_TIMEOUT",
        value_name = "SECS"
    )]
    pub connect_timeout: Option<u64>,

    /// Maximum number of retries after the first attempt
    #[arg(long = "retry-max", global = true, env = "EINVOICE_RETRY_MAX")]
    pub retry_max: Option<u32>,

    /// Base retry delay in milliseconds
    #[arg(
        long = "retry-delay-ms",
        global = true,
        env = "EINVOICE_RETRY_DELAY_MS",
        value_name = "MS"
    )]
    pub retry_delay_ms: Option<u64>,

    /// Skip TLS certificate verification (local testing only)
    #[arg(long, global = true, env = "EINVOICE_INSECURE")]
    pub insecure: bool,

    /// Bearer token for the Authorization header
    #[arg(
        long = "bearer-token",
        global = true,
        env = "EINVOICE_BEARER_TOKEN",
        hide_env_values = true
    )]
    pub bearer_token: Option<String>,

    /// API key sent as X-API-Key
    #[arg(
        long = "api-key",
        global = true,
        env = "EINVOICE_API_KEY",
        hide_env_values = true
    )]
    pub api_key: Option<String>,

    /// Tenant key sent as X-Tenant-Key
    #[arg(
        long = "tenant-key",
        global = true,
        env = "EINVOICE_TENANT_KEY",
        hide_env_values = true
    )]
    pub tenant_key: Option<String>,

    /// Shared secret for webhook signatures
    #[arg(
        long = "webhook-secret",
        global = true,
        env = "EINVOICE_WEBHOOK_SECRET",
        hide_env_values = true
    )]
    pub webhook_secret: Option<String>,

    /// Path to configuration file
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

/// Subcommands for einvoice
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a default configuration file
    Init {
        /// Output path (default: the platform config directory)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// GET a path and print the JSON response
    Get {
        /// Path relative to the base URL
        path: String,

        /// Query parameter (can be specified multiple times; repeated keys form a list)
        #[arg(long = "query", short = 'q', value_name = "K=V")]
        query: Vec<String>,
    },

    /// GET a path and save the raw response body (e.g. a PDF)
    Download {
        /// Path relative to the base URL
        path: String,

        /// File to write the body to
        #[arg(long, short)]
        output: PathBuf,

        /// Query parameter (can be specified multiple times; repeated keys form a list)
        #[arg(long = "query", short = 'q', value_name = "K=V")]
        query: Vec<String>,
    },

    /// Sign or verify webhook deliveries
    #[command(subcommand)]
    Webhook(WebhookCommand),
}

/// Webhook subcommands
#[derive(Debug, Subcommand)]
pub enum WebhookCommand {
    /// Print the signature header for a payload
    Sign {
        /// File containing the raw payload
        #[arg(long)]
        payload: PathBuf,

        /// Unix timestamp to sign at (default: now)
        #[arg(long, allow_hyphen_values = true)]
        timestamp: Option<i64>,
    },

    /// Verify a signature header and print the decoded payload
    Verify {
        /// File containing the raw payload
        #[arg(long)]
        payload: PathBuf,

        /// Signature header value (`t=<ts>,v1=<hex>`)
        #[arg(long)]
        signature: String,

        /// Skip the timestamp check (disables replay protection)
        #[arg(long = "ignore-timestamp")]
        ignore_timestamp: bool,
    },
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Parses CLI arguments from an iterator (useful for testing).
    pub fn parse_from_iter<I, T>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::parse_from(iter)
    }

    /// Returns true if this is the init command.
    #[must_use]
    pub const fn is_init(&self) -> bool {
        matches!(self.command, Command::Init { .. })
    }
}

/// Builds a [`Query`] from `key=value` strings.
///
/// Keys keep the order of their first appearance; a key given more than
/// once becomes a list parameter.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidQuery`] for entries without `=` or with an
/// empty key.
pub fn parse_query(pairs: &[String]) -> Result<Query, ConfigError> {
    let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();

    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .filter(|(key, _)| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::InvalidQuery {
                value: pair.clone(),
            })?;
        let key = key.trim();

        match grouped.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, values)) => values.push(value),
            None => grouped.push((key, vec![value])),
        }
    }

    Ok(grouped
        .into_iter()
        .fold(Query::new(), |query, (key, mut values)| {
            if values.len() == 1 {
                query.with(key, values.remove(0))
            } else {
                query.with(key, values)
            }
        }))
}
