//! Single-flight status polling.
//!
//! A [`StatusPoller`] owns at most one background loop, keyed by job id.
//! Each tick fetches the full snapshot and compares its serialized form to
//! the last one seen; only changes reach the observer. After
//! `failure_threshold` consecutive fetch errors the observer's `on_error`
//! fires once and the loop stops until [`StatusPoller::resume`] is called.
//! The loop also ends once the job's status is terminal.
//!
//! All loop bookkeeping lives in a [`PollState`] moved into the task and
//! handed back when it exits.

use std::sync::Arc;
use std::time::Duration;

use drape_core::job::{Job, JobStatus};
use drape_core::types::JobId;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::events::{diff_suggestions, SuggestionEvent};
use crate::fetcher::JobFetcher;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Consecutive fetch failures tolerated before giving up.
    pub failure_threshold: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            failure_threshold: 3,
        }
    }
}

/// Receives poller notifications. Called from the polling task.
pub trait PollObserver: Send + Sync {
    /// The snapshot changed. `events` lists what is new since the previous one.
    fn on_update(&self, job: &Job, events: &[SuggestionEvent]);

    /// Polling stopped after too many consecutive failures.
    fn on_error(&self, job_id: JobId, error: &ClientError);
}

/// Why a polling loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    Stopped,
    FailureThreshold,
    JobFinished,
}

/// Bookkeeping for one job's polling loop.
#[derive(Debug, Clone)]
pub struct PollState {
    pub job_id: JobId,
    last_serialized: Option<String>,
    last_job: Option<Job>,
    pub consecutive_failures: u32,
}

impl PollState {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            last_serialized: None,
            last_job: None,
            consecutive_failures: 0,
        }
    }

    pub fn last_job(&self) -> Option<&Job> {
        self.last_job.as_ref()
    }

    /// Record a fetched snapshot. Returns the new events, or `None` when
    /// the snapshot is identical to the last one.
    fn observe(&mut self, job: Job) -> Result<Option<Vec<SuggestionEvent>>, ClientError> {
        self.consecutive_failures = 0;
        let serialized = serde_json::to_string(&job)?;
        if self.last_serialized.as_deref() == Some(serialized.as_str()) {
            return Ok(None);
        }
        let events = diff_suggestions(self.last_job.as_ref(), &job);
        self.last_serialized = Some(serialized);
        self.last_job = Some(job);
        Ok(Some(events))
    }
}

struct ActiveLoop {
    job_id: JobId,
    cancel: CancellationToken,
    handle: JoinHandle<(PollState, PollExit)>,
}

pub struct StatusPoller {
    fetcher: Arc<dyn JobFetcher>,
    observer: Arc<dyn PollObserver>,
    config: PollerConfig,
    active: Option<ActiveLoop>,
}

impl StatusPoller {
    pub fn new(
        fetcher: Arc<dyn JobFetcher>,
        observer: Arc<dyn PollObserver>,
        config: PollerConfig,
    ) -> Self {
        Self {
            fetcher,
            observer,
            config,
            active: None,
        }
    }

    /// Point the poller at `job_id`.
    ///
    /// `None` tears down any running loop and starts nothing. The id that is
    /// already being polled is a no-op. Any other id replaces the current
    /// loop with one that starts from fresh state.
    pub async fn watch(&mut self, job_id: Option<JobId>) {
        let Some(job_id) = job_id else {
            self.stop().await;
            return;
        };
        if self.is_running() && self.watched() == Some(job_id) {
            return;
        }
        self.stop().await;
        self.spawn(PollState::new(job_id));
    }

    /// Restart a loop that has ended, typically after it gave up on errors.
    /// The last snapshot is kept so unchanged state is not reported again;
    /// the failure count starts over. Does nothing while a loop is running
    /// or when no job is being watched.
    pub async fn resume(&mut self) {
        if self.is_running() {
            return;
        }
        if let Some((mut state, exit)) = self.take_finished().await {
            tracing::debug!(job_id = %state.job_id, ?exit, "Resuming status polling");
            state.consecutive_failures = 0;
            self.spawn(state);
        }
    }

    /// Stop polling. Returns the final state of the loop, if there was one.
    pub async fn stop(&mut self) -> Option<PollState> {
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
        self.take_finished().await.map(|(state, _)| state)
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Job id of the current or most recent loop.
    pub fn watched(&self) -> Option<JobId> {
        self.active.as_ref().map(|active| active.job_id)
    }

    fn spawn(&mut self, state: PollState) {
        let cancel = CancellationToken::new();
        let job_id = state.job_id;
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.observer),
            self.config.clone(),
            state,
            cancel.clone(),
        ));
        self.active = Some(ActiveLoop {
            job_id,
            cancel,
            handle,
        });
    }

    async fn take_finished(&mut self) -> Option<(PollState, PollExit)> {
        let active = self.active.take()?;
        match active.handle.await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::error!(job_id = %active.job_id, error = %e, "Polling task ended abnormally");
                None
            }
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}

async fn poll_loop(
    fetcher: Arc<dyn JobFetcher>,
    observer: Arc<dyn PollObserver>,
    config: PollerConfig,
    mut state: PollState,
    cancel: CancellationToken,
) -> (PollState, PollExit) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let job_id = state.job_id;
    tracing::debug!(%job_id, interval_ms = config.interval.as_millis() as u64, "Status polling started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return (state, PollExit::Stopped),
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return (state, PollExit::Stopped),
            result = fetcher.fetch(job_id) => result,
        };

        let error = match result.and_then(|job| {
            let finished = matches!(job.status, JobStatus::Completed | JobStatus::Failed);
            state.observe(job).map(|events| (events, finished))
        }) {
            Ok((events, finished)) => {
                if let (Some(events), Some(job)) = (events, state.last_job()) {
                    observer.on_update(job, &events);
                }
                if finished {
                    tracing::debug!(%job_id, "Job finished, status polling stopped");
                    return (state, PollExit::JobFinished);
                }
                continue;
            }
            Err(e) => e,
        };

        state.consecutive_failures += 1;
        tracing::warn!(
            %job_id,
            failures = state.consecutive_failures,
            error = %error,
            "Status fetch failed",
        );
        if state.consecutive_failures >= config.failure_threshold {
            observer.on_error(job_id, &error);
            return (state, PollExit::FailureThreshold);
        }
    }
}
