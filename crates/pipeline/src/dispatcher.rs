//! Fire-and-forget generation triggers.
//!
//! Handlers push a [`GenerationRequest`] onto the [`GenerationQueue`] and
//! return immediately. A single long-lived [`Dispatcher`] task drains the
//! queue and runs each request on its own Tokio task, bounded by a
//! semaphore. The suggestion's status in the job store is the supervising
//! record of every run.

use std::sync::Arc;
use std::time::Duration;

use drape_core::types::{JobId, SuggestionIndex};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::runner::PipelineRunner;

/// One queued pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationRequest {
    pub job_id: JobId,
    pub suggestion_index: SuggestionIndex,
}

/// Sending half of the trigger queue.
#[derive(Clone)]
pub struct GenerationQueue {
    sender: mpsc::Sender<GenerationRequest>,
}

impl GenerationQueue {
    /// Create a bounded queue and the receiver the dispatcher drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<GenerationRequest>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Queue a run without waiting for it.
    pub fn enqueue(&self, request: GenerationRequest) -> Result<(), PipelineError> {
        self.sender.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PipelineError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PipelineError::QueueClosed,
        })?;
        tracing::debug!(
            job_id = %request.job_id,
            suggestion_index = request.suggestion_index,
            "Generation queued",
        );
        Ok(())
    }
}

/// Background worker pool executing queued runs.
pub struct Dispatcher {
    runner: Arc<PipelineRunner>,
    max_concurrent_runs: usize,
    drain_timeout: Duration,
}

impl Dispatcher {
    pub fn new(runner: Arc<PipelineRunner>, max_concurrent_runs: usize) -> Self {
        Self {
            runner,
            max_concurrent_runs: max_concurrent_runs.max(1),
            drain_timeout: Duration::from_secs(30),
        }
    }

    /// How long shutdown waits for in-flight runs before aborting them.
    /// Aborted runs keep their lock until its TTL expires and can be
    /// triggered again afterwards.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Run until the cancellation token fires or every queue sender is
    /// dropped, then drain in-flight runs.
    pub async fn run(self, mut receiver: mpsc::Receiver<GenerationRequest>, cancel: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_runs));
        let mut tasks = JoinSet::new();
        tracing::info!(max_concurrent_runs = self.max_concurrent_runs, "Generation dispatcher started");

        loop {
            let request = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Generation dispatcher shutting down");
                    break;
                }
                request = receiver.recv() => match request {
                    Some(request) => request,
                    None => {
                        tracing::info!("Generation queue closed, dispatcher stopping");
                        break;
                    }
                },
            };

            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let runner = Arc::clone(&self.runner);
            tasks.spawn(async move {
                let _permit = permit;
                // Outcomes are logged by the runner; store failures too.
                let _ = runner.run(request.job_id, request.suggestion_index).await;
            });

            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Pipeline task ended abnormally");
                }
            }
        }

        self.drain(tasks).await;
    }

    async fn drain(&self, mut tasks: JoinSet<()>) {
        if tasks.is_empty() {
            return;
        }
        tracing::info!(in_flight = tasks.len(), "Waiting for in-flight generations");
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Pipeline task ended abnormally");
                }
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(aborted = tasks.len(), "Drain timeout reached, aborting generations");
            tasks.abort_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            job_id: JobId::new(),
            suggestion_index: 0,
        }
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let (queue, _receiver) = GenerationQueue::channel(1);
        queue.enqueue(request()).unwrap();
        assert_matches!(queue.enqueue(request()), Err(PipelineError::QueueFull));
    }

    #[tokio::test]
    async fn closed_queue_is_reported() {
        let (queue, receiver) = GenerationQueue::channel(4);
        drop(receiver);
        assert_matches!(queue.enqueue(request()), Err(PipelineError::QueueClosed));
    }

    #[tokio::test]
    async fn queued_requests_arrive_in_order() {
        let (queue, mut receiver) = GenerationQueue::channel(4);
        let first = request();
        let second = request();
        queue.enqueue(first).unwrap();
        queue.enqueue(second).unwrap();
        assert_eq!(receiver.recv().await, Some(first));
        assert_eq!(receiver.recv().await, Some(second));
    }
}
