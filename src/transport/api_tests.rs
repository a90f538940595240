//! Tests for `ApiClient` request building and the retry loop.

use super::{
    ApiClient, ApiError, ApiRequest, ClientConfig, Credential, HttpClient, HttpError, HttpRequest,
    HttpResponse, Query, RetryPolicy,
};
use crate::time::{FixedClock, InstantSleeper, Sleeper, TokioSleeper};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock HTTP client that returns a scripted sequence of responses.
#[derive(Debug)]
struct MockClient {
    responses: Mutex<Vec<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<HttpRequest>>,
    call_count: AtomicUsize,
}

impl MockClient {
    fn new(responses: Vec<Result<HttpResponse, HttpError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        })
    }

    fn ok(body: &str) -> Arc<Self> {
        Self::new(vec![Ok(response(StatusCode::OK, body))])
    }

    fn repeating(status: StatusCode, times: usize) -> Arc<Self> {
        Self::new((0..times).map(|_| Ok(response(status, "{}"))).collect())
    }

    fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> HttpRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

impl HttpClient for MockClient {
    async fn request(&self, req: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(req);
        let mut responses = self.responses.lock().unwrap();
        assert!(!responses.is_empty(), "unexpected extra request");
        responses.remove(0)
    }
}

/// Sleeper that records requested delays without waiting.
#[derive(Debug, Clone, Default)]
struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

fn response(status: StatusCode, body: &str) -> HttpResponse {
    HttpResponse::new(status, HeaderMap::new(), body.as_bytes().to_vec())
}

fn response_with_header(status: StatusCode, name: &'static str, value: &'static str) -> HttpResponse {
    let mut headers = HeaderMap::new();
    headers.insert(name, HeaderValue::from_static(value));
    HttpResponse::new(status, headers, b"{}".to_vec())
}

fn config() -> ClientConfig {
    ClientConfig::new("https://api.example.com/v1/")
}

fn client(http: &Arc<MockClient>) -> ApiClient<Arc<MockClient>, InstantSleeper> {
    ApiClient::new(Arc::clone(http), &config()).with_sleeper(InstantSleeper)
}

mod request_building {
    use super::*;

    #[tokio::test]
    async fn json_requests_carry_default_headers() {
        let http = MockClient::ok("{}");

        client(&http).get("invoices", Query::new()).await.unwrap();

        let req = http.last_request();
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.headers["accept"], "application/json");
        assert_eq!(req.headers["content-type"], "application/json");
        assert_eq!(
            req.headers["user-agent"],
            format!("einvoice-sdk/{}", env!("CARGO_PKG_VERSION")).as_str()
        );
        assert!(req.headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn raw_requests_accept_anything_without_content_type() {
        let http = MockClient::ok("%PDF");

        let bytes = client(&http)
            .get_raw("invoices/1/pdf", Query::new())
            .await
            .unwrap();

        let req = http.last_request();
        assert_eq!(bytes, b"%PDF");
        assert_eq!(req.headers["accept"], "*/*");
        assert!(req.headers.get("content-type").is_none());
    }

    #[tokio::test]
    async fn per_request_headers_override_defaults() {
        let http = MockClient::ok("{}");
        let request = ApiRequest::get("invoices")
            .with_header(http::header::ACCEPT, HeaderValue::from_static("application/xml"))
            .with_header(
                http::HeaderName::from_static("idempotency-key"),
                HeaderValue::from_static("k-1"),
            );

        client(&http).send(request).await.unwrap();

        let req = http.last_request();
        assert_eq!(req.headers["accept"], "application/xml");
        assert_eq!(req.headers["idempotency-key"], "k-1");
    }

    #[tokio::test]
    async fn custom_user_agent_is_sent() {
        let http = MockClient::ok("{}");
        let api = ApiClient::new(Arc::clone(&http), &config().with_user_agent("erp-sync/3.1"))
            .with_sleeper(InstantSleeper);

        api.delete("invoices/9").await.unwrap();

        assert_eq!(http.last_request().headers["user-agent"], "erp-sync/3.1");
    }

    #[tokio::test]
    async fn path_is_joined_with_a_single_slash() {
        let http = MockClient::repeating(StatusCode::OK, 2);
        let api = client(&http);

        api.get("/invoices", Query::new()).await.unwrap();
        assert_eq!(
            http.last_request().url.as_str(),
            "https://api.example.com/v1/invoices"
        );

        api.get("invoices", Query::new().with("ids", vec!["1", "2"]))
            .await
            .unwrap();
        assert_eq!(
            http.last_request().url.as_str(),
            "https://api.example.com/v1/invoices?ids%5B%5D=1&ids%5B%5D=2"
        );
    }

    #[tokio::test]
    async fn post_serializes_body_as_json() {
        let http = MockClient::ok(r#"{"id":7}"#);

        let body = client(&http)
            .post("invoices", &serde_json::json!({"number": "INV-7"}))
            .await
            .unwrap();

        let req = http.last_request();
        assert_eq!(req.method, Method::POST);
        let sent: serde_json::Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, serde_json::json!({"number": "INV-7"}));
        assert_eq!(body, serde_json::json!({"id": 7}));
    }

    #[tokio::test]
    async fn unserializable_body_fails_before_sending() {
        let http = MockClient::new(vec![]);
        let mut body = std::collections::HashMap::new();
        body.insert((1, 2), "tuple keys are not valid JSON keys");

        let err = client(&http).put("invoices/1", &body).await.unwrap_err();

        assert!(matches!(err, ApiError::Serialize(_)));
        assert_eq!(http.calls(), 0);
    }

    #[tokio::test]
    async fn unparseable_base_url_is_invalid_path() {
        let http = MockClient::new(vec![]);
        let api = ApiClient::new(Arc::clone(&http), &ClientConfig::new("not a url"))
            .with_sleeper(InstantSleeper);

        let err = api.get("invoices", Query::new()).await.unwrap_err();

        assert!(matches!(err, ApiError::InvalidPath { .. }));
        assert_eq!(http.calls(), 0);
    }
}

mod responses {
    use super::*;

    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Invoice {
        id: u32,
        number: String,
    }

    #[tokio::test]
    async fn empty_success_body_is_empty_object() {
        let http = MockClient::new(vec![Ok(response(StatusCode::NO_CONTENT, ""))]);

        let body = client(&http).delete("invoices/1").await.unwrap();

        assert_eq!(body, serde_json::json!({}));
    }

    #[tokio::test]
    async fn send_as_deserializes_typed_body() {
        let http = MockClient::ok(r#"{"id":3,"number":"INV-3","extra":true}"#);

        let invoice: Invoice = client(&http)
            .send_as(ApiRequest::get("invoices/3"))
            .await
            .unwrap();

        assert_eq!(
            invoice,
            Invoice {
                id: 3,
                number: "INV-3".to_string()
            }
        );
    }

    #[tokio::test]
    async fn send_as_reports_shape_mismatch_as_decode_error() {
        let http = MockClient::ok(r#"{"id":"three"}"#);

        let err = client(&http)
            .send_as::<Invoice>(ApiRequest::get("invoices/3"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Decode(_)));
    }
}

mod credentials {
    use super::*;

    #[tokio::test]
    async fn replacing_credential_sends_only_the_latest() {
        let http = MockClient::ok("{}");
        let api = client(&http).with_api_key("key").with_bearer_token("tok");

        api.get("me", Query::new()).await.unwrap();

        let req = http.last_request();
        assert!(api.has_credentials());
        assert_eq!(req.headers["authorization"], "Bearer tok");
        assert!(req.headers.get("x-api-key").is_none());
        assert!(req.headers.get("x-tenant-key").is_none());
    }

    #[tokio::test]
    async fn tenant_key_is_sent_in_its_header() {
        let http = MockClient::ok("{}");
        let api = client(&http).with_tenant_key("tenant-1");

        api.get("me", Query::new()).await.unwrap();

        assert_eq!(http.last_request().headers["x-tenant-key"], "tenant-1");
        assert_eq!(api.credential(), Some(&Credential::TenantKey("tenant-1".to_string())));
    }

    #[test]
    fn without_credentials_clears_the_credential() {
        let http = MockClient::new(vec![]);
        let api = client(&http).with_bearer_token("tok").without_credentials();

        assert!(!api.has_credentials());
        assert!(api.credential().is_none());
    }

    #[tokio::test]
    async fn invalid_secret_fails_before_sending() {
        let http = MockClient::new(vec![]);
        let api = client(&http).with_api_key("line\nbreak");

        let err = api.get("me", Query::new()).await.unwrap_err();

        assert!(matches!(err, ApiError::InvalidCredential(_)));
        assert_eq!(http.calls(), 0);
    }
}

mod retries {
    use super::*;

    #[tokio::test]
    async fn succeeds_after_transient_failures_with_growing_delays() {
        let mut scripted: Vec<_> = (0..3)
            .map(|_| Ok(response(StatusCode::SERVICE_UNAVAILABLE, "")))
            .collect();
        scripted.push(Ok(response(StatusCode::OK, r#"{"ok":true}"#)));
        let http = MockClient::new(scripted);
        let sleeper = RecordingSleeper::default();
        let api = ApiClient::new(Arc::clone(&http), &config()).with_sleeper(sleeper.clone());

        let body = api.get("invoices", Query::new()).await.unwrap();

        assert_eq!(body, serde_json::json!({"ok": true}));
        assert_eq!(http.calls(), 4);
        let delays = sleeper.delays();
        assert_eq!(delays.len(), 3);
        for (delay, base_ms) in delays.iter().zip([100_u64, 200, 400]) {
            let base = Duration::from_millis(base_ms);
            assert!(*delay >= base, "{delay:?} < {base:?}");
            assert!(*delay <= base + base / 4 + Duration::from_nanos(1), "{delay:?}");
        }
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_last_response() {
        let http = MockClient::repeating(StatusCode::SERVICE_UNAVAILABLE, 4);

        let err = client(&http).get("invoices", Query::new()).await.unwrap_err();

        assert_eq!(http.calls(), 4);
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn zero_retries_makes_a_single_attempt() {
        let http = MockClient::repeating(StatusCode::BAD_GATEWAY, 1);
        let api = client(&http).with_retry_policy(RetryPolicy::new().with_max_retries(0));

        let err = api.get("invoices", Query::new()).await.unwrap_err();

        assert_eq!(http.calls(), 1);
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
    }

    #[tokio::test]
    async fn post_is_not_retried_on_client_errors() {
        let http = MockClient::repeating(StatusCode::NOT_FOUND, 1);

        let err = client(&http)
            .post("invoices", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert_eq!(http.calls(), 1);
        assert!(matches!(err, ApiError::Api { status, .. } if status == StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn post_is_not_retried_on_request_timeout_status() {
        let http = MockClient::repeating(StatusCode::REQUEST_TIMEOUT, 1);

        client(&http)
            .post("invoices", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn get_is_retried_on_request_timeout_status() {
        let http = MockClient::new(vec![
            Ok(response(StatusCode::REQUEST_TIMEOUT, "")),
            Ok(response(StatusCode::OK, "{}")),
        ]);

        client(&http).get("invoices", Query::new()).await.unwrap();

        assert_eq!(http.calls(), 2);
    }

    #[tokio::test]
    async fn post_is_retried_on_server_errors() {
        let http = MockClient::new(vec![
            Ok(response(StatusCode::INTERNAL_SERVER_ERROR, "")),
            Ok(response(StatusCode::CREATED, r#"{"id":1}"#)),
        ]);

        let body = client(&http)
            .post("invoices", &serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(http.calls(), 2);
        assert_eq!(body, serde_json::json!({"id": 1}));
    }

    #[tokio::test]
    async fn authentication_and_validation_errors_are_not_retried() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::UNPROCESSABLE_ENTITY] {
            let http = MockClient::repeating(status, 1);

            let err = client(&http).get("invoices", Query::new()).await.unwrap_err();

            assert_eq!(http.calls(), 1, "{status}");
            assert_eq!(err.status(), Some(status));
        }
    }

    #[tokio::test]
    async fn retry_after_seconds_overrides_backoff() {
        let http = MockClient::new(vec![
            Ok(response_with_header(StatusCode::TOO_MANY_REQUESTS, "retry-after", "5")),
            Ok(response(StatusCode::OK, "{}")),
        ]);
        let sleeper = RecordingSleeper::default();
        let api = ApiClient::new(Arc::clone(&http), &config()).with_sleeper(sleeper.clone());

        api.get("invoices", Query::new()).await.unwrap();

        assert_eq!(sleeper.delays(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn retry_after_date_is_measured_against_the_clock() {
        let http = MockClient::new(vec![
            Ok(response_with_header(
                StatusCode::SERVICE_UNAVAILABLE,
                "retry-after",
                "Wed, 21 Oct 2015 07:28:30 GMT",
            )),
            Ok(response(StatusCode::OK, "{}")),
        ]);
        let sleeper = RecordingSleeper::default();
        let api = ApiClient::new(Arc::clone(&http), &config())
            .with_sleeper(sleeper.clone())
            .with_clock(FixedClock::from_unix_seconds(1_445_412_480));

        api.get("invoices", Query::new()).await.unwrap();

        assert_eq!(sleeper.delays(), vec![Duration::from_secs(30)]);
    }

    #[tokio::test]
    async fn rate_limit_after_exhaustion_carries_headers() {
        let http = MockClient::new(vec![
            Ok(response_with_header(StatusCode::TOO_MANY_REQUESTS, "retry-after", "1")),
            Ok(response_with_header(StatusCode::TOO_MANY_REQUESTS, "retry-after", "2")),
        ]);
        let api = client(&http).with_retry_policy(RetryPolicy::new().with_max_retries(1));

        let err = api.get("invoices", Query::new()).await.unwrap_err();

        let ApiError::RateLimited { info, .. } = err else {
            panic!("expected rate-limit error, got {err:?}");
        };
        assert_eq!(info.retry_after, Some(2));
    }

    #[tokio::test]
    async fn connection_failures_are_retried_then_surface_as_transport_errors() {
        let http = MockClient::new(
            (0..4)
                .map(|_| Err(HttpError::Connection("connection refused".into())))
                .collect(),
        );

        let err = client(&http)
            .post("invoices", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert_eq!(http.calls(), 4);
        assert!(matches!(err, ApiError::Transport(HttpError::Connection(_))));
    }

    #[tokio::test]
    async fn invalid_url_errors_are_not_retried() {
        let http = MockClient::new(vec![Err(HttpError::InvalidUrl("bad".to_string()))]);

        let err = client(&http).get("invoices", Query::new()).await.unwrap_err();

        assert_eq!(http.calls(), 1);
        assert!(matches!(err, ApiError::Transport(HttpError::InvalidUrl(_))));
    }
}

mod call_timeout {
    use super::*;

    /// Client whose requests never complete.
    struct Hanging;

    impl HttpClient for Hanging {
        async fn request(&self, _req: HttpRequest) -> Result<HttpResponse, HttpError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_further_retries() {
        let http = MockClient::repeating(StatusCode::SERVICE_UNAVAILABLE, 4);
        let api = ApiClient::new(Arc::clone(&http), &config())
            .with_sleeper(TokioSleeper)
            .with_retry_policy(RetryPolicy::new().with_base_delay(Duration::from_secs(10)))
            .with_call_timeout(Duration::from_secs(15));

        let err = api.get("invoices", Query::new()).await.unwrap_err();

        assert_eq!(http.calls(), 2);
        assert!(matches!(err, ApiError::Transport(HttpError::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_retry_after_under_deadline_times_out() {
        let http = MockClient::new(vec![Ok(response_with_header(
            StatusCode::SERVICE_UNAVAILABLE,
            "retry-after",
            "18446744073709551615",
        ))]);
        let api = ApiClient::new(Arc::clone(&http), &config())
            .with_sleeper(TokioSleeper)
            .with_call_timeout(Duration::from_secs(5));

        let err = api.get("invoices", Query::new()).await.unwrap_err();

        assert_eq!(http.calls(), 1);
        assert!(matches!(err, ApiError::Transport(HttpError::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_attempt_times_out() {
        let api = ApiClient::new(Hanging, &config()).with_call_timeout(Duration::from_secs(5));

        let err = api.get("invoices", Query::new()).await.unwrap_err();

        assert!(matches!(err, ApiError::Transport(HttpError::Timeout)));
    }

    #[tokio::test]
    async fn fast_calls_are_unaffected() {
        let http = MockClient::ok(r#"{"fast":true}"#);
        let api = client(&http).with_call_timeout(Duration::from_secs(5));

        let body = api.get("invoices", Query::new()).await.unwrap();

        assert_eq!(body, serde_json::json!({"fast": true}));
    }
}
