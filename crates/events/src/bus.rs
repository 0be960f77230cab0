//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`GenerationEvent`]s. It is
//! shared via `Arc<EventBus>` between the API handlers and the pipeline.

use chrono::{DateTime, Utc};
use drape_core::types::{JobId, SuggestionIndex};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// GenerationEvent
// ---------------------------------------------------------------------------

/// A job or suggestion lifecycle event.
///
/// Built with [`GenerationEvent::new`] and enriched with
/// [`for_job`](GenerationEvent::for_job),
/// [`for_suggestion`](GenerationEvent::for_suggestion) and
/// [`with_payload`](GenerationEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationEvent {
    /// Dot-separated event name, e.g. `"suggestion.succeeded"`.
    pub event_type: String,

    pub job_id: Option<JobId>,

    pub suggestion_index: Option<SuggestionIndex>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl GenerationEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            job_id: None,
            suggestion_index: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn for_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn for_suggestion(mut self, job_id: JobId, index: SuggestionIndex) -> Self {
        self.job_id = Some(job_id);
        self.suggestion_index = Some(index);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use drape_events::bus::{EventBus, GenerationEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(GenerationEvent::new("job.created"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<GenerationEvent>,
}

impl EventBus {
    /// When the buffer is full the oldest messages are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped silently when nobody
    /// is listening.
    pub fn publish(&self, event: GenerationEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use drape_core::job_events::{EVENT_JOB_CREATED, EVENT_SUGGESTION_SUCCEEDED};

    use super::*;

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let job_id = JobId::new();

        bus.publish(
            GenerationEvent::new(EVENT_SUGGESTION_SUCCEEDED)
                .for_suggestion(job_id, 2)
                .with_payload(serde_json::json!({ "images": 1 })),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, EVENT_SUGGESTION_SUCCEEDED);
        assert_eq!(received.job_id, Some(job_id));
        assert_eq!(received.suggestion_index, Some(2));
        assert_eq!(received.payload["images"], 1);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(GenerationEvent::new(EVENT_JOB_CREATED));

        assert_eq!(rx1.recv().await.unwrap().event_type, EVENT_JOB_CREATED);
        assert_eq!(rx2.recv().await.unwrap().event_type, EVENT_JOB_CREATED);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        EventBus::default().publish(GenerationEvent::new("orphan.event"));
    }

    #[test]
    fn job_scope_leaves_suggestion_empty() {
        let event = GenerationEvent::new(EVENT_JOB_CREATED).for_job(JobId::new());
        assert!(event.job_id.is_some());
        assert!(event.suggestion_index.is_none());
        assert!(event.payload.is_object());
    }
}
