//! Production HTTP client implementation using reqwest.

use std::time::Duration;

use super::{HttpClient, HttpError, HttpRequest, HttpResponse, RetryPolicy};

/// Connection and retry settings for an [`ApiClient`](super::ApiClient).
///
/// These are plain constructor parameters; the [`config`](crate::config)
/// module produces them from files and the environment, the transport never
/// reads either itself.
///
/// # Defaults
///
/// - `timeout`: 30 seconds (whole request)
/// - `connect_timeout`: 10 seconds
/// - `retry`: [`RetryPolicy::default`] (3 retries, 100 ms base delay)
/// - `danger_accept_invalid_certs`: `false`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL every request path is joined onto, without trailing slash.
    pub base_url: String,

    /// Total timeout for a single attempt.
    pub timeout: Duration,

    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,

    /// Retry policy applied to every call.
    pub retry: RetryPolicy,

    /// Skips TLS certificate verification.
    ///
    /// Only for local development against self-signed endpoints; never
    /// enable it against production.
    pub danger_accept_invalid_certs: bool,

    /// `User-Agent` override; defaults to [`ClientConfig::default_user_agent`].
    pub user_agent: Option<String>,
}

impl ClientConfig {
    /// Default whole-request timeout (30 seconds).
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Default connect timeout (10 seconds).
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a configuration for `base_url` with default settings.
    ///
    /// Trailing slashes are stripped from the base URL.
    #[must_use]
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            retry: RetryPolicy::default(),
            danger_accept_invalid_certs: false,
            user_agent: None,
        }
    }

    /// Sets the whole-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Disables TLS certificate verification. Local development only.
    #[must_use]
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.danger_accept_invalid_certs = accept;
        self
    }

    /// Overrides the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Returns the `User-Agent` this configuration sends.
    #[must_use]
    pub fn effective_user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(Self::default_user_agent)
    }

    /// `einvoice-sdk/<crate version>`.
    #[must_use]
    pub fn default_user_agent() -> String {
        format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

/// Production HTTP client using reqwest.
///
/// A thin wrapper around `reqwest::Client` implementing [`HttpClient`]. It
/// inherits reqwest's connection pooling; retries happen one layer up.
///
/// # Example
///
/// ```no_run
/// use einvoice_sdk::transport::{ClientConfig, HttpClient, HttpRequest, ReqwestClient};
/// use url::Url;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ReqwestClient::from_config(&ClientConfig::new("https://api.example.com"))?;
/// let request = HttpRequest::get(Url::parse("https://api.example.com/v1/status")?);
/// let response = client.request(request).await?;
/// println!("Status: {}", response.status);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    /// Builds a client honouring the timeouts and TLS settings of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Connection`] if the TLS backend cannot be
    /// initialised.
    pub fn from_config(config: &ClientConfig) -> Result<Self, HttpError> {
        if config.danger_accept_invalid_certs {
            tracing::warn!(
                base_url = %config.base_url,
                "TLS certificate verification is DISABLED; do not use this configuration in production"
            );
        }

        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(config.danger_accept_invalid_certs)
            .build()
            .map_err(|e| HttpError::Connection(Box::new(e)))?;

        Ok(Self { inner })
    }

    /// Creates an HTTP client from an existing reqwest client.
    ///
    /// Useful when you need custom configuration (proxies, extra roots).
    #[must_use]
    pub const fn from_client(client: reqwest::Client) -> Self {
        Self { inner: client }
    }
}

impl HttpClient for ReqwestClient {
    async fn request(&self, req: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = self
            .inner
            .request(req.method, req.url.as_str())
            .headers(req.headers);

        if let Some(body) = req.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_send_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(map_send_error)?
            .to_vec();

        Ok(HttpResponse::new(status, headers, body))
    }
}

fn map_send_error(e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        HttpError::Timeout
    } else if e.is_builder() {
        HttpError::InvalidUrl(e.to_string())
    } else {
        HttpError::Connection(Box::new(e))
    }
}
