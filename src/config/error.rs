//! Error types for configuration parsing and validation.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for configuration operations.
///
/// Covers errors from parsing, validation, and file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file '{}': {source}", path.display())]
    FileRead {
        /// Path to the config file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to write configuration file (for init command).
    #[error("Failed to write config file '{}': {source}", path.display())]
    FileWrite {
        /// Path to the config file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Refused to overwrite an existing configuration file.
    #[error("Config file '{}' already exists (use --force to overwrite)", path.display())]
    FileExists {
        /// Path to the existing file
        path: PathBuf,
    },

    /// Missing required field that must be provided by CLI, environment or config file.
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired {
        /// Name of the missing field
        field: &'static str,
        /// Hint for how to provide the value
        hint: &'static str,
    },

    /// Invalid URL provided.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The invalid URL string
        url: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Invalid duration value (zero or too large).
    #[error("Invalid duration for {field}: {reason}")]
    InvalidDuration {
        /// Name of the field
        field: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// More than one credential was configured at the same level.
    #[error("Conflicting credentials: both {first} and {second} are set, configure only one")]
    ConflictingCredentials {
        /// The first credential found
        first: &'static str,
        /// The second credential found
        second: &'static str,
    },

    /// Invalid query parameter.
    #[error("Invalid query parameter '{value}': expected 'key=value'")]
    InvalidQuery {
        /// The invalid parameter string
        value: String,
    },
}

/// Well-known field names for `MissingRequired` errors.
///
/// Use these constants for compile-time safety when matching field names.
pub mod field {
    /// The API base URL field.
    pub const BASE_URL: &str = "base_url";
    /// The webhook secret field.
    pub const WEBHOOK_SECRET: &str = "webhook_secret";
}

impl ConfigError {
    /// Creates a `MissingRequired` error for a required field.
    #[must_use]
    pub const fn missing(field: &'static str, hint: &'static str) -> Self {
        Self::MissingRequired { field, hint }
    }
}
