//! Authenticated request dispatch with single-flight credential renewal
//!
//! Every request goes out with the stored access token as its bearer
//! credential. A 401 triggers renewal with the stored refresh token; the
//! original request is then replayed exactly once with the new access token.
//!
//! At most one renewal is in flight at any time. The first caller to need one
//! spawns it and publishes a shared ticket; every caller that hits a 401
//! while the ticket is outstanding awaits that same ticket and sees the same
//! outcome. The renewal runs on its own task, so it completes even if every
//! waiting caller is dropped.
//!
//! Renewal failure is terminal: both credential halves are cleared and each
//! waiting caller gets `DispatchError::RenewalFailed` carrying its original
//! 401 response.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use common::Secret;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{Instrument, debug, error, info, info_span, warn};
use transport::{ApiRequest, ApiResponse, Transport};
use uuid::Uuid;
use vault::WriteOutcome;

use crate::error::{DispatchError, RenewalError, Result};
use crate::facade::CredentialFacade;
use crate::renewal::Renewer;

/// Settled result of one renewal: the new access token or why there is none.
type RenewalOutcome = std::result::Result<Secret<String>, RenewalError>;

/// Handle every caller awaiting the in-flight renewal shares.
type Ticket = Shared<BoxFuture<'static, RenewalOutcome>>;

/// Whether a renewal is currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Renewing,
}

/// Renewal slot. `ticket` is `Some` exactly while `Renewing`; `generation`
/// identifies which renewal owns the slot.
#[derive(Default)]
struct RenewalSlot {
    generation: u64,
    ticket: Option<Ticket>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    renewer: Arc<dyn Renewer>,
    facade: Arc<CredentialFacade>,
    slot: Mutex<RenewalSlot>,
}

/// Authenticated request pipeline. Cheap to clone; clones share renewal state.
#[derive(Clone)]
pub struct AuthenticatedPipeline {
    inner: Arc<Inner>,
}

impl AuthenticatedPipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        renewer: Arc<dyn Renewer>,
        facade: Arc<CredentialFacade>,
    ) -> Self {
        info!(transport = transport.id(), "authenticated pipeline ready");
        Self {
            inner: Arc::new(Inner {
                transport,
                renewer,
                facade,
                slot: Mutex::new(RenewalSlot::default()),
            }),
        }
    }

    pub fn facade(&self) -> &Arc<CredentialFacade> {
        &self.inner.facade
    }

    pub async fn state(&self) -> PipelineState {
        if self.inner.slot.lock().await.ticket.is_some() {
            PipelineState::Renewing
        } else {
            PipelineState::Idle
        }
    }

    /// Send `request` with the current credential, renewing once on 401.
    ///
    /// Any non-401 response, including the response to the single retry, is
    /// returned as `Ok`.
    pub async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request_id = format!("req_{}", Uuid::new_v4());
        let span = info_span!(
            "dispatch",
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
        );

        let result = self.dispatch_inner(request).instrument(span).await;
        let label = match &result {
            Ok((_, false)) => "passthrough",
            Ok((_, true)) => "retried",
            Err(e) if e.is_session_expired() => "session_expired",
            Err(_) => "transport_error",
        };
        metrics::counter!("session_dispatch_total", "result" => label).increment(1);

        result.map(|(response, _)| response)
    }

    /// Returns the final response and whether it came from a retry.
    async fn dispatch_inner(&self, request: ApiRequest) -> Result<(ApiResponse, bool)> {
        let sent_token = self.inner.facade.get_token().await;
        let response = self.inner.send(&request, sent_token.as_deref()).await?;
        if !response.is_authorization_failure() {
            return Ok((response, false));
        }
        debug!(status = response.status, "authorization failure");

        let ticket = {
            let mut slot = self.inner.slot.lock().await;
            match slot.ticket.clone() {
                Some(ticket) => {
                    debug!("renewal already in flight, waiting on it");
                    ticket
                }
                None => {
                    // A renewal may have settled between our send and this 401
                    let current = self.inner.facade.get_token().await;
                    if let Some(current) = current.filter(|c| sent_token.as_ref() != Some(c)) {
                        drop(slot);
                        debug!("credential changed while request was in flight, retrying");
                        let retried = self.inner.send(&request, Some(current.as_str())).await?;
                        return Ok((retried, true));
                    }

                    let Some(refresh) = self.inner.facade.get_refresh_token().await else {
                        info!("authorization failed and no refresh token is stored");
                        return Err(DispatchError::RefreshTokenMissing { response });
                    };

                    slot.generation += 1;
                    let ticket = self.inner.start_renewal(refresh, slot.generation);
                    slot.ticket = Some(ticket.clone());
                    ticket
                }
            }
        };

        match ticket.await {
            Ok(access) => {
                let retried = self.inner.send(&request, Some(access.expose().as_str())).await?;
                debug!(status = retried.status, "retried with renewed credential");
                Ok((retried, true))
            }
            Err(reason) => Err(DispatchError::RenewalFailed { reason, response }),
        }
    }
}

impl Inner {
    async fn send(&self, request: &ApiRequest, token: Option<&str>) -> Result<ApiResponse> {
        let mut outgoing = request.clone();
        if let Some(token) = token {
            outgoing.set_bearer(token)?;
        }
        Ok(self.transport.send(outgoing).await?)
    }

    /// Spawn the renewal task and wrap its handle in a shareable ticket.
    fn start_renewal(self: &Arc<Self>, refresh: String, generation: u64) -> Ticket {
        let task = {
            let inner = Arc::clone(self);
            tokio::spawn(
                async move { inner.renew(refresh, generation).await }
                    .instrument(info_span!("renewal", generation)),
            )
        };

        let inner = Arc::clone(self);
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // Aborted before reaching `finish`; settle it as a failure here
                    error!(error = %e, "renewal task ended unexpectedly, clearing session");
                    inner.facade.clear_tokens().await;
                    metrics::counter!("session_renewals_total", "outcome" => "failure")
                        .increment(1);
                    inner.finish(generation).await;
                    Err(RenewalError::Interrupted(e.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn renew(&self, refresh: String, generation: u64) -> RenewalOutcome {
        let attempt = AssertUnwindSafe(self.renewer.renew(&refresh))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(RenewalError::Interrupted("renewer panicked".into())));

        let outcome = match attempt {
            Ok(pair) => {
                if self.facade.set_pair(&pair.access, &pair.refresh).await
                    == WriteOutcome::Dropped
                {
                    warn!("renewed credentials could not be persisted");
                }
                metrics::counter!("session_renewals_total", "outcome" => "success").increment(1);
                info!("credential renewal succeeded");
                Ok(Secret::new(pair.access))
            }
            Err(e) => {
                warn!(error = %e, "credential renewal failed, clearing session");
                self.facade.clear_tokens().await;
                metrics::counter!("session_renewals_total", "outcome" => "failure").increment(1);
                Err(e)
            }
        };

        self.finish(generation).await;
        outcome
    }

    /// Return to `Idle` if the slot still belongs to `generation`.
    async fn finish(&self, generation: u64) {
        let mut slot = self.slot.lock().await;
        if slot.generation == generation {
            slot.ticket = None;
        }
    }
}
