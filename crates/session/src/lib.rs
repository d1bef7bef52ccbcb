//! Session credentials and authenticated dispatch for the portal client
//!
//! Builds on the `vault` store: `CredentialFacade` gives the access/refresh
//! token pair fixed names, and `AuthenticatedPipeline` attaches the access
//! token to every portal request and renews the pair on 401.
//!
//! Request lifecycle:
//! 1. `dispatch()` reads the access token and sends with `Authorization: Bearer`
//! 2. Anything but 401 is returned to the caller unchanged
//! 3. On 401 the first caller starts a renewal; concurrent callers join it
//! 4. Success: new pair stored, original request replayed once
//! 5. Failure: pair cleared, every waiter gets `DispatchError::RenewalFailed`

pub mod cleanup;
pub mod error;
pub mod facade;
pub mod pipeline;
pub mod renewal;

pub use cleanup::spawn_cleanup_task;
pub use error::{DispatchError, RenewalError, Result};
pub use facade::{CredentialFacade, CredentialPair, FacadeConfig};
pub use pipeline::{AuthenticatedPipeline, PipelineState};
pub use renewal::{HttpRenewer, RenewFuture, Renewer, TokenPair};
