//! Transport abstraction for portal API calls
//!
//! Defines the `Transport` trait the authenticated pipeline sends requests
//! through, plus the request/response types it exchanges. `HttpTransport`
//! is the reqwest-backed implementation used by the host; tests substitute
//! scripted transports behind the same trait.
//!
//! The pipeline only needs to recognise one status class (authorization
//! failure) to trigger credential renewal. Everything else is passed through
//! untouched, which `classify_status` makes explicit.

pub mod http;

pub use http::HttpTransport;
pub use reqwest::Method;
pub use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use std::future::Future;
use std::pin::Pin;

/// Coarse classification of a portal API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx
    Success,
    /// 401: the bearer credential was missing, expired or rejected
    AuthorizationFailure,
    /// Any other status, including 403 (role checks are the server's business)
    Other,
}

/// Classify a response status for the renewal decision.
pub fn classify_status(status: u16) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Success,
        401 => ResponseClass::AuthorizationFailure,
        _ => ResponseClass::Other,
    }
}

/// Errors from sending a request (no response was received).
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// An outbound portal API request.
///
/// `path` is relative to the transport's base URL. Requests are `Clone` so
/// the pipeline can replay the original request once after renewal.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Replace the Authorization header with `Bearer <token>`.
    ///
    /// Fails only when the token contains bytes that are not valid in a
    /// header value.
    pub fn set_bearer(&mut self, token: &str) -> Result<()> {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| TransportError::InvalidRequest(format!("invalid bearer token: {e}")))?;
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    /// Token currently attached as the bearer credential, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// A response received from the portal API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn class(&self) -> ResponseClass {
        classify_status(self.status)
    }

    pub fn is_success(&self) -> bool {
        self.class() == ResponseClass::Success
    }

    pub fn is_authorization_failure(&self) -> bool {
        self.class() == ResponseClass::AuthorizationFailure
    }
}

/// Sends portal API requests.
///
/// Uses `Pin<Box<dyn Future>>` return types so implementations can be held
/// as `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    /// Identifier for logging (e.g. "http")
    fn id(&self) -> &str;

    /// Send a request and return whatever response the server produced.
    ///
    /// Non-2xx statuses are responses, not errors; `Err` means no response
    /// was received at all.
    fn send(
        &self,
        request: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + '_>>;
}
