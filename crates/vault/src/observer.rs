//! Observability hook for absorbed storage faults
//!
//! The store never returns its internal faults to callers; it reports them
//! here instead. `TracingObserver` logs each fault and counts it in
//! `vault_faults_total{kind}`.

use tracing::{debug, warn};

use crate::error::Error;

/// Receives every fault the store absorbs.
pub trait Observer: Send + Sync {
    /// `key` is the item name involved, or `None` for key-material faults.
    fn report(&self, key: Option<&str>, error: &Error);
}

/// Default observer: structured log line plus a metrics counter.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn report(&self, key: Option<&str>, error: &Error) {
        let kind = error.kind();
        metrics::counter!("vault_faults_total", "kind" => kind).increment(1);

        match error {
            // Expiry is routine; everything else means degraded protection or lost data
            Error::Expired => debug!(key, kind, "evicted expired item"),
            _ => warn!(key, kind, error = %error, "vault fault absorbed"),
        }
    }
}
