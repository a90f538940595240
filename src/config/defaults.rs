//! Default values for configuration options.
//!
//! Centralized constants to avoid magic numbers scattered across the codebase.

use std::path::PathBuf;
use std::time::Duration;

/// Default total request timeout in seconds.
pub const TIMEOUT_SECS: u64 = 30;

/// Default connection timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default maximum number of retries after the first attempt.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Default base retry delay in milliseconds.
pub const RETRY_BASE_DELAY_MS: u64 = 100;

/// Default webhook replay window in seconds.
pub const WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Directory under the platform config dir holding the config file.
pub const CONFIG_DIR_NAME: &str = "einvoice";

/// File name of the config file.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default total request timeout as Duration.
#[must_use]
pub const fn timeout() -> Duration {
    Duration::from_secs(TIMEOUT_SECS)
}

/// Default connection timeout as Duration.
#[must_use]
pub const fn connect_timeout() -> Duration {
    Duration::from_secs(CONNECT_TIMEOUT_SECS)
}

/// Default base retry delay as Duration.
#[must_use]
pub const fn retry_base_delay() -> Duration {
    Duration::from_millis(RETRY_BASE_DELAY_MS)
}

/// Default webhook replay window as Duration.
#[must_use]
pub const fn webhook_tolerance() -> Duration {
    Duration::from_secs(WEBHOOK_TOLERANCE_SECS)
}

/// `<platform config dir>/einvoice/config.toml`, if the platform has one.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
