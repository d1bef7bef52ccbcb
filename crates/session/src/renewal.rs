//! Credential renewal against the portal's refresh endpoint
//!
//! `HttpRenewer` POSTs `{"refresh": "<token>"}` to `{base_url}{renewal_path}`
//! and expects a new access/refresh pair back. Any non-2xx status is a
//! renewal failure; the pipeline treats every failure as terminal.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RenewalError;

/// Boxed future returned by `Renewer::renew`.
pub type RenewFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<TokenPair, RenewalError>> + Send + 'a>>;

/// A freshly issued credential pair.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenPair {
    #[serde(alias = "access_token")]
    pub access: String,
    #[serde(alias = "refresh_token")]
    pub refresh: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"[REDACTED]")
            .field("refresh", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize)]
struct RenewalRequest<'a> {
    refresh: &'a str,
}

/// Exchanges a refresh token for a new pair.
pub trait Renewer: Send + Sync {
    fn renew<'a>(&'a self, refresh: &'a str) -> RenewFuture<'a>;
}

/// Renewer backed by the portal's HTTP refresh endpoint.
#[derive(Debug, Clone)]
pub struct HttpRenewer {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpRenewer {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        renewal_path: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                renewal_path.trim_start_matches('/')
            ),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Renewer for HttpRenewer {
    fn renew<'a>(&'a self, refresh: &'a str) -> RenewFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.endpoint)
                .json(&RenewalRequest { refresh })
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| RenewalError::Http(format!("{}: {e}", self.endpoint)))?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| String::from("<no body>"));
                return Err(RenewalError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            let pair = response
                .json::<TokenPair>()
                .await
                .map_err(|e| RenewalError::InvalidResponse(e.to_string()))?;
            debug!(endpoint = %self.endpoint, "renewal endpoint issued new pair");
            Ok(pair)
        })
    }
}
