//! Periodic removal of expired execution lock rows.
//!
//! Expired rows never block an acquisition, but runs that crashed leave
//! them behind. This loop deletes them on a fixed interval.

use std::time::Duration;

use drape_db::PgExecutionLock;
use tokio_util::sync::CancellationToken;

/// How often the sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(900);

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(lock: PgExecutionLock, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Lock sweep started");
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Lock sweep stopping");
                break;
            }
            _ = ticker.tick() => {
                match lock.purge_expired().await {
                    Ok(0) => tracing::debug!("Lock sweep: nothing to purge"),
                    Ok(purged) => tracing::info!(purged, "Lock sweep: removed expired locks"),
                    Err(e) => tracing::error!(error = %e, "Lock sweep failed"),
                }
            }
        }
    }
}
