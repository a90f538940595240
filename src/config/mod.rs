//! Configuration layer for the `einvoice` command-line tool.
//!
//! This module provides:
//! - CLI argument parsing ([`Cli`], [`Command`], [`WebhookCommand`])
//! - TOML configuration file parsing ([`TomlConfig`])
//! - Validated configuration ([`ValidatedConfig`])
//! - Configuration file generation ([`write_default_config`])
//! - Default values ([`defaults`])
//!
//! The SDK types in [`crate::transport`] and [`crate::webhook`] never read
//! configuration themselves; this layer resolves the settings and hands
//! them over as plain values.
//!
//! # Priority
//!
//! Configuration values are resolved with the following priority (highest to lowest):
//!
//! 1. **Explicit CLI arguments** - Values passed on the command line
//! 2. **Environment variables** - `EINVOICE_*`, bound to the same CLI options
//! 3. **TOML config file** - `--config`, or `<config dir>/einvoice/config.toml` if present
//! 4. **Built-in defaults** - Hardcoded default values
//!
//! # Credentials
//!
//! At most one of bearer token, API key and tenant key may be set per level.
//! A credential from the CLI/environment replaces the TOML credential
//! entirely, even when the TOML file configures a different kind.
//!
//! # Boolean Flag Semantics
//!
//! `--insecure` uses OR semantics: if set in either CLI or TOML
//! (`api.danger_accept_invalid_certs`), TLS verification is disabled.
//!
//! # TOML-Only Options
//!
//! - `api.user_agent` - User-Agent override
//! - `webhook.tolerance` - Replay window in seconds (default: 300)

mod cli;
pub mod defaults;
mod error;
mod toml;
mod validated;


pub use cli::{Cli, Command, WebhookCommand, parse_query};
pub use error::{ConfigError, field};
pub use toml::{ApiSection, AuthSection, RetrySection, TomlConfig, WebhookSection, default_config_template};
pub use validated::{ValidatedConfig, default_output_path, write_default_config};
