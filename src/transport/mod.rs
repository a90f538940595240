//! HTTP transport for the e-invoicing API.
//!
//! This module provides types and traits for:
//! - Describing logical API calls ([`ApiRequest`], [`Query`])
//! - Single-attempt HTTP exchange ([`HttpClient`], [`HttpRequest`], [`HttpResponse`])
//! - Production HTTP client implementation ([`ReqwestClient`], [`ClientConfig`])
//! - Retry decisions and backoff ([`RetryPolicy`])
//! - Authentication ([`Credential`])
//! - The client callers use ([`ApiClient`]) and its errors ([`ApiError`])

mod api;
mod client;
mod credential;
mod error;
mod http;
mod request;
mod retry;

#[cfg(test)]
mod api_tests;

pub use api::ApiClient;
pub use client::{ClientConfig, ReqwestClient};
pub use credential::{API_KEY_HEADER, Credential, TENANT_KEY_HEADER};
pub use error::{ApiError, HttpError, RateLimitInfo};
pub use self::http::{HttpClient, HttpRequest, HttpResponse};
pub use request::{ApiRequest, Query, QueryValue, ResponseFormat};
pub use retry::RetryPolicy;
