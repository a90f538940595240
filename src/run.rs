//! Command execution.
//!
//! Commands are first resolved into a [`Task`] against the validated
//! configuration (configuration problems surface there), then executed
//! on the async runtime.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use einvoice_sdk::config::{
    Command, ConfigError, ValidatedConfig, WebhookCommand, parse_query,
};
use einvoice_sdk::transport::{ApiClient, ApiError, ClientConfig, Credential, Query};
use einvoice_sdk::webhook::{SignatureError, WebhookVerifier};

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;

/// Error type for runtime execution failures.
#[derive(Debug, Error)]
pub enum RunError {
    /// The API call failed.
    #[error("API request failed: {0}")]
    Api(#[from] ApiError),

    /// Webhook verification failed.
    #[error("Webhook verification failed: {0}")]
    Signature(#[from] SignatureError),

    /// Failed to read an input file.
    #[error("Failed to read '{}': {source}", path.display())]
    ReadInput {
        /// Path of the input file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write an output file.
    #[error("Failed to write '{}': {source}", path.display())]
    WriteOutput {
        /// Path of the output file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to print the result.
    #[error("Failed to print result: {0}")]
    Print(#[source] std::io::Error),
}

/// API connection settings shared by the API commands.
#[derive(Debug)]
pub struct Connection {
    client: ClientConfig,
    credential: Option<Credential>,
}

impl Connection {
    fn from_config(config: &ValidatedConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: config.client_config()?,
            credential: config.credential.clone(),
        })
    }

    fn api_client(&self) -> Result<ApiClient, ApiError> {
        ApiClient::from_config(&self.client)
            .map(|client| client.with_credential(self.credential.clone()))
    }
}

/// A fully resolved command, ready to execute.
#[derive(Debug)]
pub enum Task {
    /// Fetch JSON and print it.
    Get {
        connection: Connection,
        path: String,
        query: Query,
    },
    /// Fetch raw bytes into a file.
    Download {
        connection: Connection,
        path: String,
        query: Query,
        output: PathBuf,
    },
    /// Print a signature header for a payload file.
    Sign {
        verifier: WebhookVerifier,
        payload: PathBuf,
        timestamp: Option<i64>,
    },
    /// Verify a payload file and print the decoded JSON.
    Verify {
        verifier: WebhookVerifier,
        payload: PathBuf,
        signature: String,
        /// `None` skips the timestamp check.
        tolerance: Option<Duration>,
    },
}

impl Task {
    /// Resolves `command` against `config`.
    ///
    /// Returns `None` for `init`, which runs before any configuration is
    /// loaded.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a setting the command needs is missing
    /// or an argument is malformed.
    pub fn resolve(command: Command, config: &ValidatedConfig) -> Result<Option<Self>, ConfigError> {
        let task = match command {
            Command::Init { .. } => return Ok(None),
            Command::Get { path, query } => Self::Get {
                connection: Connection::from_config(config)?,
                path,
                query: parse_query(&query)?,
            },
            Command::Download {
                path,
                output,
                query,
            } => Self::Download {
                connection: Connection::from_config(config)?,
                path,
                query: parse_query(&query)?,
                output,
            },
            Command::Webhook(WebhookCommand::Sign { payload, timestamp }) => Self::Sign {
                verifier: WebhookVerifier::new(config.webhook_secret()?),
                payload,
                timestamp,
            },
            Command::Webhook(WebhookCommand::Verify {
                payload,
                signature,
                ignore_timestamp,
            }) => Self::Verify {
                verifier: WebhookVerifier::new(config.webhook_secret()?),
                payload,
                signature,
                tolerance: (!ignore_timestamp).then_some(config.webhook_tolerance),
            },
        };

        Ok(Some(task))
    }
}

/// Executes `task`, printing its result to `out`.
///
/// # Errors
///
/// Returns an error if the API call, the verification or file I/O fails.
pub async fn execute<W: Write>(task: Task, out: &mut W) -> Result<(), RunError> {
    match task {
        Task::Get {
            connection,
            path,
            query,
        } => {
            let client = connection.api_client()?;
            let body = client.get(&path, query).await?;
            tracing::info!("GET {path} succeeded");
            print_json(out, &body)
        }
        Task::Download {
            connection,
            path,
            query,
            output,
        } => {
            let client = connection.api_client()?;
            let bytes = client.get_raw(&path, query).await?;
            tokio::fs::write(&output, &bytes)
                .await
                .map_err(|source| RunError::WriteOutput {
                    path: output.clone(),
                    source,
                })?;
            tracing::info!(
                "Downloaded {} bytes from {path} to {}",
                bytes.len(),
                output.display()
            );
            Ok(())
        }
        Task::Sign {
            verifier,
            payload,
            timestamp,
        } => {
            let body = read_input(&payload).await?;
            let header = match timestamp {
                Some(t) => verifier.generate_signature_at(&body, t),
                None => verifier.generate_signature(&body),
            };
            writeln!(out, "{header}").map_err(RunError::Print)
        }
        Task::Verify {
            verifier,
            payload,
            signature,
            tolerance,
        } => {
            let body = read_input(&payload).await?;
            let decoded = match tolerance {
                Some(tolerance) => verifier.verify_with_tolerance(&body, &signature, tolerance)?,
                None => {
                    tracing::warn!("Timestamp check disabled, replayed deliveries will verify");
                    verifier.verify_ignoring_timestamp(&body, &signature)?
                }
            };
            tracing::info!("Signature valid");
            print_json(out, &decoded)
        }
    }
}

async fn read_input(path: &Path) -> Result<Vec<u8>, RunError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| RunError::ReadInput {
            path: path.to_path_buf(),
            source,
        })
}

fn print_json<W: Write>(out: &mut W, value: &serde_json::Value) -> Result<(), RunError> {
    serde_json::to_writer_pretty(&mut *out, value)
        .map_err(|e| RunError::Print(e.into()))?;
    writeln!(out).map_err(RunError::Print)
}
