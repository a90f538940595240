//! Time abstractions for testability.
//!
//! - [`Clock`] supplies wall-clock time (webhook replay windows,
//!   `Retry-After` HTTP dates).
//! - [`Sleeper`] suspends between retry attempts.
//!
//! Production code uses [`SystemClock`] and [`TokioSleeper`]; tests inject
//! fixed clocks and [`InstantSleeper`].

use std::time::{Duration, SystemTime};

/// Abstraction over system time for testability.
///
/// # Example
///
/// ```
/// use einvoice_sdk::time::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let now = clock.now();
/// assert!(now >= std::time::SystemTime::UNIX_EPOCH);
/// ```
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> SystemTime;

    /// Returns the current time as whole seconds since the Unix epoch.
    ///
    /// Pre-epoch clocks report 0.
    fn unix_seconds(&self) -> i64 {
        self.now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
    }
}

/// Production clock using actual system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock frozen at a fixed instant.
///
/// Useful for generating reproducible webhook fixtures and in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub SystemTime);

impl FixedClock {
    /// Creates a clock frozen at `secs` seconds after the Unix epoch.
    #[must_use]
    pub fn from_unix_seconds(secs: u64) -> Self {
        Self(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        self.0
    }
}

/// Abstraction over asynchronous sleeping.
///
/// Dropping the returned future must cancel the sleep, so a caller-imposed
/// timeout aborts a pending retry.
pub trait Sleeper: Send + Sync {
    /// Suspends the current task for `duration`.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}

/// Production sleeper backed by [`tokio::time::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that returns immediately.
///
/// Keeps retry tests fast; never use it in production as it turns backoff
/// into a tight loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    async fn sleep(&self, _duration: Duration) {}
}
