//! Prometheus metrics exposition
//!
//! Describes the counters the library crates emit:
//!
//! - `vault_faults_total` (counter): label `kind`
//! - `session_renewals_total` (counter): label `outcome`
//! - `session_dispatch_total` (counter): label `result`

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `--metrics` prints `handle.render()` to stderr when the command finishes.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;
    describe();
    Ok(handle)
}

/// Attach help text to every counter.
pub fn describe() {
    metrics::describe_counter!(
        "vault_faults_total",
        "Storage and crypto faults absorbed by the credential vault"
    );
    metrics::describe_counter!(
        "session_renewals_total",
        "Credential renewals by outcome"
    );
    metrics::describe_counter!(
        "session_dispatch_total",
        "Authenticated portal requests by final result"
    );
}
