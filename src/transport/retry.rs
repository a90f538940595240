//! Retry decision and backoff policy for API calls.

use std::time::{Duration, SystemTime};

use http::{HeaderValue, Method, StatusCode};
use rand::Rng;

/// Decides whether a failed attempt is retried and how long to wait.
///
/// The policy is a pure value: it never performs I/O or sleeps, so it can
/// be tested without a transport. [`ApiClient`](super::ApiClient) consults
/// it after every attempt.
///
/// # Defaults
///
/// - `max_retries`: 3
/// - `base_delay`: 100 ms
///
/// # Example
///
/// ```
/// use einvoice_sdk::transport::RetryPolicy;
/// use http::{Method, StatusCode};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new()
///     .with_max_retries(5)
///     .with_base_delay(Duration::from_millis(250));
///
/// assert!(policy.should_retry(0, &Method::GET, Some(StatusCode::SERVICE_UNAVAILABLE)));
/// assert!(!policy.should_retry(0, &Method::POST, Some(StatusCode::NOT_FOUND)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    ///
    /// Zero disables retrying.
    pub max_retries: u32,

    /// Delay before the first retry; doubled for each subsequent one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Default maximum retries.
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Default base delay (100 milliseconds).
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

    /// Upper bound of the jitter added to the exponential delay, as a
    /// fraction of that delay.
    pub const MAX_JITTER: f64 = 0.25;

    /// Statuses retried for idempotent methods.
    pub const RETRYABLE_STATUSES: [StatusCode; 6] = [
        StatusCode::REQUEST_TIMEOUT,
        StatusCode::TOO_MANY_REQUESTS,
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::BAD_GATEWAY,
        StatusCode::SERVICE_UNAVAILABLE,
        StatusCode::GATEWAY_TIMEOUT,
    ];

    /// Creates a new retry policy with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            base_delay: Self::DEFAULT_BASE_DELAY,
        }
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base delay.
    ///
    /// Zero delay is supported but turns backoff into a tight retry loop.
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Returns true if `method` is treated as idempotent for retrying.
    #[must_use]
    pub fn is_idempotent(method: &Method) -> bool {
        [
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ]
        .contains(method)
    }

    /// Decides whether the attempt numbered `attempt` (0-based) is retried.
    ///
    /// `status` is `None` when no response was received at all (DNS,
    /// connect, TLS or timeout failure); those are always retried until
    /// the cap. Non-idempotent methods are retried only on 5xx or 429.
    /// Idempotent methods are retried on 408, 429, 500, 502, 503 and 504.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, method: &Method, status: Option<StatusCode>) -> bool {
        if attempt >= self.max_retries {
            return false;
        }

        let Some(status) = status else {
            return true;
        };

        if Self::is_idempotent(method) {
            Self::RETRYABLE_STATUSES.contains(&status)
        } else {
            status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
        }
    }

    /// Computes the wait before retrying attempt `attempt` (0-based).
    ///
    /// A `Retry-After` header wins over computed backoff: whole seconds, or
    /// an HTTP date measured against `now` (past dates yield zero). Without
    /// a usable header the delay is [`backoff`](Self::backoff) plus up to
    /// [`MAX_JITTER`](Self::MAX_JITTER) of it.
    #[must_use]
    pub fn delay_for_retry(
        &self,
        attempt: u32,
        retry_after: Option<&HeaderValue>,
        now: SystemTime,
    ) -> Duration {
        if let Some(delay) = retry_after.and_then(|v| parse_retry_after(v, now)) {
            return delay;
        }

        let backoff = self.backoff(attempt);
        let fraction = rand::thread_rng().gen_range(0.0..=Self::MAX_JITTER);
        with_jitter(backoff, fraction)
    }

    /// Exponential delay without jitter: `base_delay * 2^attempt`.
    ///
    /// Saturates instead of overflowing for large attempt numbers.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Adds `fraction` of `delay` on top of `delay`.
pub(super) fn with_jitter(delay: Duration, fraction: f64) -> Duration {
    let fraction = fraction.clamp(0.0, RetryPolicy::MAX_JITTER);
    delay.saturating_add(delay.mul_f64(fraction))
}

/// Parses `Retry-After` as delta-seconds or an HTTP date in any of the
/// IMF-fixdate, RFC 850 and asctime forms.
pub(super) fn parse_retry_after(value: &HeaderValue, now: SystemTime) -> Option<Duration> {
    let value = value.to_str().ok()?.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let target = httpdate::parse_http_date(value).ok()?;
    Some(target.duration_since(now).unwrap_or(Duration::ZERO))
}
