//! Error types for authenticated dispatch and renewal

use transport::{ApiResponse, TransportError};

/// Why a credential renewal did not produce a new pair.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenewalError {
    /// Renewal endpoint answered with a non-2xx status
    #[error("renewal endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("renewal request failed: {0}")]
    Http(String),

    #[error("invalid renewal response: {0}")]
    InvalidResponse(String),

    /// The renewal task ended without an outcome (panicked or was aborted)
    #[error("renewal task ended unexpectedly: {0}")]
    Interrupted(String),
}

/// Terminal outcomes of `AuthenticatedPipeline::dispatch`.
///
/// Non-401 responses are never errors; they come back as `Ok(ApiResponse)`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Authorization failed and there is no refresh token to renew with
    #[error("not authenticated: no refresh token stored")]
    RefreshTokenMissing { response: ApiResponse },

    /// Authorization failed and renewal did not succeed; credentials were cleared
    #[error("session expired: {reason}")]
    RenewalFailed {
        reason: RenewalError,
        response: ApiResponse,
    },
}

impl DispatchError {
    /// Whether the user has to sign in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(
            self,
            DispatchError::RefreshTokenMissing { .. } | DispatchError::RenewalFailed { .. }
        )
    }

    /// The original authorization-failure response, when there was one.
    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            DispatchError::Transport(_) => None,
            DispatchError::RefreshTokenMissing { response }
            | DispatchError::RenewalFailed { response, .. } => Some(response),
        }
    }
}

/// Result alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
