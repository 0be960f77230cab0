//! Structured logging of bus events.
//!
//! [`EventLog`] subscribes to the [`EventBus`](crate::bus::EventBus) and
//! writes every event as a `tracing` record. It runs as a long-lived
//! background task and exits when the bus is dropped.

use tokio::sync::broadcast;

use crate::bus::GenerationEvent;

pub struct EventLog;

impl EventLog {
    /// Run the logging loop until the channel closes. Returns the number
    /// of events logged.
    pub async fn run(mut receiver: broadcast::Receiver<GenerationEvent>) -> u64 {
        let mut logged = 0u64;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    tracing::info!(
                        target: "drape::events",
                        event_type = %event.event_type,
                        job_id = ?event.job_id,
                        suggestion_index = ?event.suggestion_index,
                        payload = %event.payload,
                        "Event",
                    );
                    logged += 1;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event log lagged, some events were not logged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event log shutting down");
                    break;
                }
            }
        }
        logged
    }
}
