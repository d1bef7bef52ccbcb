//! Periodic credential cleanup
//!
//! Expired items are already evicted lazily on read. This task additionally
//! sweeps the well-known credential records on a timer so expired ciphertext
//! does not linger on disk in a long-running host.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use vault::EncryptedItemStore;

/// Spawn a background task that calls `store.cleanup()` every `interval`.
///
/// The first tick is skipped: the host runs its own sweep at startup.
pub fn spawn_cleanup_task(
    store: Arc<EncryptedItemStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = store.cleanup().await;
            debug!(evicted, "periodic credential cleanup");
        }
    })
}
