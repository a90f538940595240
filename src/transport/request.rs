//! Logical API request descriptors.

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;

/// A query parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    /// Encoded as `key=value`.
    Scalar(String),
    /// Encoded as repeated `key[]=value` pairs.
    List(Vec<String>),
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl<T: Into<String>> From<Vec<T>> for QueryValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Ordered query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query(Vec<(String, QueryValue)>);

impl Query {
    /// Creates an empty query.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a parameter.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    /// Returns true if no parameters are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends the parameters to `url`'s query string, in insertion order.
    pub fn apply_to(&self, url: &mut url::Url) {
        if self.0.is_empty() {
            return;
        }
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &self.0 {
            match value {
                QueryValue::Scalar(v) => {
                    pairs.append_pair(key, v);
                }
                QueryValue::List(values) => {
                    let list_key = format!("{key}[]");
                    for v in values {
                        pairs.append_pair(&list_key, v);
                    }
                }
            }
        }
    }
}

impl<K: Into<String>, V: Into<QueryValue>> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Whether the response body is decoded as JSON or returned as bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// `Accept: application/json`, body decoded.
    #[default]
    Json,
    /// `Accept: */*`, no `Content-Type`, body returned untouched.
    Raw,
}

/// A logical API call: what to send, independent of base URL and auth.
///
/// Built once and never mutated afterwards; builder methods consume and
/// return the descriptor.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Query,
    body: Option<Value>,
    headers: HeaderMap,
    format: ResponseFormat,
}

impl ApiRequest {
    /// Creates a request for `method` on `path` (relative to the base URL).
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Query::new(),
            body: None,
            headers: HeaderMap::new(),
            format: ResponseFormat::Json,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Creates a PUT request.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Creates a DELETE request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Sets the query parameters.
    #[must_use]
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds a header override. Overrides win over the client's defaults.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Requests the body as raw bytes instead of JSON.
    #[must_use]
    pub fn raw(mut self) -> Self {
        self.format = ResponseFormat::Raw;
        self
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the base URL, as given.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters.
    #[must_use]
    pub const fn query(&self) -> &Query {
        &self.query
    }

    /// JSON body, if any.
    #[must_use]
    pub const fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Header overrides.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Expected response format.
    #[must_use]
    pub const fn format(&self) -> ResponseFormat {
        self.format
    }
}
