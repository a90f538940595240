//! The API client: request building, retries and response classification.

use std::time::Duration;

use http::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use http::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::time::{Clock, Sleeper, SystemClock, TokioSleeper};

use super::error::parse_body;
use super::{
    ApiError, ApiRequest, ClientConfig, Credential, HttpClient, HttpError, HttpRequest,
    HttpResponse, Query, ReqwestClient, ResponseFormat, RetryPolicy,
};

const APPLICATION_JSON: &str = "application/json";

/// Client for the e-invoicing REST API.
///
/// Sends one logical operation per call, retrying transparently according
/// to its [`RetryPolicy`]; only the final outcome reaches the caller.
///
/// The client is immutable once built: credential setters consume it and
/// return a new value, so a shared `ApiClient` (e.g. behind `Arc`) can be
/// used from many tasks. Build one client per credential when callers need
/// different identities.
///
/// # Type Parameters
///
/// - `H`: the single-attempt [`HttpClient`] (defaults to [`ReqwestClient`])
/// - `S`: the [`Sleeper`] used between retries (defaults to [`TokioSleeper`])
/// - `C`: the [`Clock`] used for `Retry-After` dates (defaults to [`SystemClock`])
///
/// # Example
///
/// ```no_run
/// use einvoice_sdk::transport::{ApiClient, ClientConfig, Query};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::from_config(&ClientConfig::new("https://api.example.com/v1"))?
///     .with_api_key("my-key");
///
/// let invoices = client
///     .get("invoices", Query::new().with("status", "sent"))
///     .await?;
/// println!("{invoices}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ApiClient<H = ReqwestClient, S = TokioSleeper, C = SystemClock> {
    http: H,
    sleeper: S,
    clock: C,
    base_url: String,
    user_agent: HeaderValue,
    retry_policy: RetryPolicy,
    credential: Option<Credential>,
    call_timeout: Option<Duration>,
}

impl ApiClient<ReqwestClient, TokioSleeper, SystemClock> {
    /// Builds a production client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the underlying HTTP client cannot
    /// be constructed.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let http = ReqwestClient::from_config(config)?;
        Ok(Self::new(http, config))
    }
}

impl<H> ApiClient<H, TokioSleeper, SystemClock> {
    /// Wraps an existing [`HttpClient`] with the base URL, user agent and
    /// retry policy of `config`.
    ///
    /// Timeouts and TLS settings of `config` apply only when building the
    /// HTTP client itself (see [`ApiClient::from_config`]).
    #[must_use]
    pub fn new(http: H, config: &ClientConfig) -> Self {
        let user_agent = config.effective_user_agent();
        let user_agent = HeaderValue::try_from(user_agent.as_str()).unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid User-Agent '{user_agent}', using the default");
            HeaderValue::try_from(ClientConfig::default_user_agent())
                .unwrap_or_else(|_| HeaderValue::from_static("einvoice-sdk"))
        });

        Self {
            http,
            sleeper: TokioSleeper,
            clock: SystemClock,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent,
            retry_policy: config.retry.clone(),
            credential: None,
            call_timeout: None,
        }
    }
}

impl<H, S, C> ApiClient<H, S, C> {
    /// Sets a custom sleeper for retry delays.
    ///
    /// This is primarily useful for testing to avoid actual delays.
    #[must_use]
    pub fn with_sleeper<S2>(self, sleeper: S2) -> ApiClient<H, S2, C> {
        ApiClient {
            http: self.http,
            sleeper,
            clock: self.clock,
            base_url: self.base_url,
            user_agent: self.user_agent,
            retry_policy: self.retry_policy,
            credential: self.credential,
            call_timeout: self.call_timeout,
        }
    }

    /// Sets a custom clock for evaluating `Retry-After` dates.
    #[must_use]
    pub fn with_clock<C2>(self, clock: C2) -> ApiClient<H, S, C2> {
        ApiClient {
            http: self.http,
            sleeper: self.sleeper,
            clock,
            base_url: self.base_url,
            user_agent: self.user_agent,
            retry_policy: self.retry_policy,
            credential: self.credential,
            call_timeout: self.call_timeout,
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Bounds a whole logical call, retries and their delays included.
    ///
    /// When the limit is reached mid-retry no further attempt is made.
    #[must_use]
    pub fn with_call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = Some(limit);
        self
    }

    /// Replaces the active credential (or clears it with `None`).
    #[must_use]
    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    /// Authenticates with `Authorization: Bearer <token>`, replacing any
    /// other credential.
    #[must_use]
    pub fn with_bearer_token(self, token: impl Into<String>) -> Self {
        self.with_credential(Some(Credential::Bearer(token.into())))
    }

    /// Authenticates with `X-API-Key`, replacing any other credential.
    #[must_use]
    pub fn with_api_key(self, key: impl Into<String>) -> Self {
        self.with_credential(Some(Credential::ApiKey(key.into())))
    }

    /// Authenticates with `X-Tenant-Key`, replacing any other credential.
    #[must_use]
    pub fn with_tenant_key(self, key: impl Into<String>) -> Self {
        self.with_credential(Some(Credential::TenantKey(key.into())))
    }

    /// Removes the active credential.
    #[must_use]
    pub fn without_credentials(self) -> Self {
        self.with_credential(None)
    }

    /// Returns true if a credential is set.
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        self.credential.is_some()
    }

    /// Returns the active credential.
    #[must_use]
    pub const fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Returns the base URL, without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Joins `path` onto the base URL with exactly one slash.
    fn url_for(&self, path: &str) -> Result<url::Url, ApiError> {
        let joined = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        url::Url::parse(&joined).map_err(|e| ApiError::InvalidPath {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Default headers for `format`, before per-request overrides.
    fn default_headers(&self, format: ResponseFormat) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        match format {
            ResponseFormat::Json => {
                headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
            }
            ResponseFormat::Raw => {
                headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
            }
        }
        headers.insert(USER_AGENT, self.user_agent.clone());

        if let Some(credential) = &self.credential {
            let value = credential
                .header_value()
                .map_err(ApiError::InvalidCredential)?;
            headers.insert(credential.header_name(), value);
        }

        Ok(headers)
    }

    /// Resolves a logical request into a wire request.
    fn build_request(&self, request: &ApiRequest) -> Result<HttpRequest, ApiError> {
        let mut url = self.url_for(request.path())?;
        request.query().apply_to(&mut url);

        let mut http_request = HttpRequest::new(request.method().clone(), url);
        http_request.headers = self.default_headers(request.format())?;
        for (name, value) in request.headers() {
            http_request.headers.insert(name, value.clone());
        }

        if let Some(body) = request.body() {
            http_request.body = Some(serde_json::to_vec(body).map_err(ApiError::Serialize)?);
        }

        Ok(http_request)
    }
}

impl<H: HttpClient, S: Sleeper, C: Clock> ApiClient<H, S, C> {
    /// `GET path` with query parameters, decoded as JSON.
    ///
    /// # Errors
    ///
    /// Returns a classified [`ApiError`] for non-2xx responses or transport
    /// failures, after retries are exhausted.
    pub async fn get(&self, path: &str, query: Query) -> Result<Value, ApiError> {
        self.send(ApiRequest::get(path).with_query(query)).await
    }

    /// `POST path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`]; also fails if `body` cannot be serialized.
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, ApiError> {
        let body = serde_json::to_value(body).map_err(ApiError::Serialize)?;
        self.send(ApiRequest::post(path).with_body(body)).await
    }

    /// `PUT path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::post`].
    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, ApiError> {
        let body = serde_json::to_value(body).map_err(ApiError::Serialize)?;
        self.send(ApiRequest::put(path).with_body(body)).await
    }

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`].
    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.send(ApiRequest::delete(path)).await
    }

    /// `GET path` returning the raw body, e.g. a PDF download.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`].
    pub async fn get_raw(&self, path: &str, query: Query) -> Result<Vec<u8>, ApiError> {
        self.send_raw(ApiRequest::get(path).with_query(query)).await
    }

    /// Sends `request` and decodes the 2xx body as JSON.
    ///
    /// An empty or unparseable success body yields an empty object.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`].
    pub async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let response = self.execute(&request).await?;
        Ok(parse_body(&response.body))
    }

    /// Sends `request` and deserializes the 2xx body into `T`.
    ///
    /// # Errors
    ///
    /// Besides the errors of [`ApiClient::get`], returns
    /// [`ApiError::Decode`] when the body does not match `T`.
    pub async fn send_as<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let value = self.send(request).await?;
        serde_json::from_value(value).map_err(ApiError::Decode)
    }

    /// Sends `request` as a raw download and returns the body untouched.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`].
    pub async fn send_raw(&self, request: ApiRequest) -> Result<Vec<u8>, ApiError> {
        let response = self.execute(&request.raw()).await?;
        Ok(response.body)
    }

    /// Runs a request to completion, under the call timeout if one is set.
    async fn execute(&self, request: &ApiRequest) -> Result<HttpResponse, ApiError> {
        let http_request = self.build_request(request)?;

        let Some(limit) = self.call_timeout else {
            return self.execute_with_retry(http_request, None).await;
        };

        let deadline = tokio::time::Instant::now() + limit;
        tokio::time::timeout_at(deadline, self.execute_with_retry(http_request, Some(deadline)))
            .await
            .unwrap_or_else(|_| {
                tracing::warn!("Call exceeded its {limit:?} time limit, giving up");
                Err(HttpError::Timeout.into())
            })
    }

    /// The retry loop. Each attempt, including the delay before it,
    /// finishes before the next one starts.
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<HttpResponse, ApiError> {
        let method = request.method.clone();
        let path = request.url.path().to_string();
        let mut attempt: u32 = 0;

        loop {
            tracing::debug!("{method} {path} (attempt {})", attempt + 1);
            let outcome = self.http.request(request.clone()).await;

            let retry = match &outcome {
                Ok(response) if response.is_success() => false,
                Ok(response) => self
                    .retry_policy
                    .should_retry(attempt, &method, Some(response.status)),
                Err(HttpError::InvalidUrl(_)) => false,
                Err(_) => self.retry_policy.should_retry(attempt, &method, None),
            };

            if !retry {
                return finish(outcome);
            }

            let retry_after = outcome
                .as_ref()
                .ok()
                .and_then(|response| response.headers.get(RETRY_AFTER));
            let delay = self
                .retry_policy
                .delay_for_retry(attempt, retry_after, self.clock.now());

            let past_deadline = deadline.is_some_and(|d| {
                tokio::time::Instant::now()
                    .checked_add(delay)
                    .is_none_or(|wake| wake >= d)
            });
            if past_deadline {
                tracing::warn!(
                    "{method} {path}: next retry in {delay:?} would pass the call deadline, giving up"
                );
                return Err(HttpError::Timeout.into());
            }

            match &outcome {
                Ok(response) => tracing::warn!(
                    "{method} {path} returned {}, retrying in {delay:?} (retry {} of {})",
                    response.status,
                    attempt + 1,
                    self.retry_policy.max_retries
                ),
                Err(e) => tracing::warn!(
                    "{method} {path} failed: {e}, retrying in {delay:?} (retry {} of {})",
                    attempt + 1,
                    self.retry_policy.max_retries
                ),
            }

            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Converts the final attempt into the caller-visible result.
fn finish(outcome: Result<HttpResponse, HttpError>) -> Result<HttpResponse, ApiError> {
    match outcome {
        Ok(response) if response.is_success() => {
            tracing::debug!("Request succeeded with {}", response.status);
            Ok(response)
        }
        Ok(response) => Err(ApiError::from_response(
            response.status,
            &response.headers,
            &response.body,
        )),
        Err(e) => Err(e.into()),
    }
}
