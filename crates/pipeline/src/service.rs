//! Job lifecycle operations used by the HTTP layer.

use std::sync::Arc;

use chrono::Utc;
use drape_core::error::CoreError;
use drape_core::generation::{
    resolve_suggestion_count, validate_custom_prompt, validate_image_ref, validate_occasion,
};
use drape_core::job::{Job, JobInput, SuggestionPatch};
use drape_core::job_events::{
    EVENT_JOB_CANCEL_REQUESTED, EVENT_JOB_CREATED, EVENT_JOB_FAILED, EVENT_SUGGESTIONS_READY,
};
use drape_core::types::{JobId, SuggestionIndex};
use drape_db::JobStore;
use drape_events::{EventBus, GenerationEvent};
use serde_json::json;

use crate::advisor::{AdvisorError, StyleAdvisor};
use crate::dispatcher::{GenerationQueue, GenerationRequest};
use crate::error::PipelineError;

/// Error written to suggestions the advisor produced no text for.
pub const NO_SUGGESTION_TEXT: &str = "No suggestion text was produced";

pub struct GenerationService {
    store: Arc<dyn JobStore>,
    advisor: Arc<dyn StyleAdvisor>,
    queue: GenerationQueue,
    bus: Arc<EventBus>,
    default_suggestion_count: usize,
}

impl GenerationService {
    pub fn new(
        store: Arc<dyn JobStore>,
        advisor: Arc<dyn StyleAdvisor>,
        queue: GenerationQueue,
        bus: Arc<EventBus>,
        default_suggestion_count: usize,
    ) -> Self {
        Self {
            store,
            advisor,
            queue,
            bus,
            default_suggestion_count,
        }
    }

    /// Check a job request and resolve its suggestion count.
    pub fn validate(&self, input: &JobInput, suggestion_count: Option<usize>) -> Result<usize, CoreError> {
        validate_image_ref("human_image_url", &input.human_image_url)?;
        validate_image_ref("garment_image_url", &input.garment_image_url)?;
        validate_occasion(&input.occasion)?;
        validate_custom_prompt(input.custom_prompt.as_deref())?;
        resolve_suggestion_count(suggestion_count.or(Some(self.default_suggestion_count)))
    }

    /// Persist a new job and start preparing it in the background.
    pub async fn create_job(
        self: &Arc<Self>,
        input: JobInput,
        suggestion_count: Option<usize>,
    ) -> Result<Job, PipelineError> {
        let input = input.normalized();
        let count = self.validate(&input, suggestion_count)?;
        let job = Job::new(input, count, Utc::now());
        self.store.create(&job).await?;

        tracing::info!(
            job_id = %job.job_id,
            mode = job.input.mode.as_str(),
            suggestions = count,
            "Job created",
        );
        self.bus.publish(
            GenerationEvent::new(EVENT_JOB_CREATED)
                .for_job(job.job_id)
                .with_payload(json!({ "mode": job.input.mode.as_str(), "suggestions": count })),
        );

        let service = Arc::clone(self);
        let job_id = job.job_id;
        tokio::spawn(async move {
            if let Err(e) = service.prepare(job_id).await {
                tracing::error!(%job_id, error = %e, "Job preparation failed");
            }
        });

        Ok(job)
    }

    /// Attach suggestion text to every suggestion, then trigger index 0.
    ///
    /// An advisor failure fails the whole job; suggestions the advisor did
    /// not cover are failed individually.
    pub async fn prepare(&self, job_id: JobId) -> Result<(), PipelineError> {
        let job = self.store.get_required(job_id).await?;
        let count = job.suggestions.len();

        let styles = match self.advisor.suggest(&job.input, count).await {
            Ok(styles) if !styles.is_empty() => styles,
            Ok(_) => return self.fail_job(job_id, AdvisorError::Empty).await,
            Err(e) => return self.fail_job(job_id, e).await,
        };

        let covered = styles.len().min(count);
        for (index, style) in styles.into_iter().take(count).enumerate() {
            self.patch_if_open(job_id, index, SuggestionPatch::style(style))
                .await?;
        }
        for index in covered..count {
            self.patch_if_open(job_id, index, SuggestionPatch::failed(NO_SUGGESTION_TEXT))
                .await?;
        }

        self.bus.publish(
            GenerationEvent::new(EVENT_SUGGESTIONS_READY)
                .for_job(job_id)
                .with_payload(json!({ "suggestions": covered })),
        );

        let job = self.store.get_required(job_id).await?;
        if job.cancel_requested {
            return Ok(());
        }
        self.trigger(job_id, 0).await
    }

    /// Queue a pipeline run for one suggestion. Returns once queued.
    pub async fn trigger(&self, job_id: JobId, index: SuggestionIndex) -> Result<(), PipelineError> {
        let job = self.store.get_required(job_id).await?;
        job.suggestion(index)?;
        self.queue.enqueue(GenerationRequest {
            job_id,
            suggestion_index: index,
        })
    }

    pub async fn get(&self, job_id: JobId) -> Result<Job, PipelineError> {
        Ok(self.store.get_required(job_id).await?)
    }

    /// Flag the job as cancelled. In-flight runs stop at their next stage
    /// boundary.
    pub async fn cancel(&self, job_id: JobId) -> Result<Job, PipelineError> {
        let job = self.store.request_cancel(job_id).await?;
        tracing::info!(%job_id, "Job cancellation requested");
        self.bus
            .publish(GenerationEvent::new(EVENT_JOB_CANCEL_REQUESTED).for_job(job_id));
        Ok(job)
    }

    async fn fail_job(&self, job_id: JobId, error: AdvisorError) -> Result<(), PipelineError> {
        tracing::warn!(%job_id, error = %error, "Suggestion text unavailable, failing job");
        self.store.fail_job(job_id, &error.to_string()).await?;
        self.bus.publish(
            GenerationEvent::new(EVENT_JOB_FAILED)
                .for_job(job_id)
                .with_payload(json!({ "error": error.to_string() })),
        );
        Ok(())
    }

    /// Apply a patch unless the suggestion was closed meanwhile (cancel).
    async fn patch_if_open(
        &self,
        job_id: JobId,
        index: SuggestionIndex,
        patch: SuggestionPatch,
    ) -> Result<(), PipelineError> {
        match self.store.update_suggestion(job_id, index, &patch).await {
            Ok(_) => Ok(()),
            Err(drape_db::StoreError::Core(CoreError::Conflict(reason))) => {
                tracing::debug!(%job_id, suggestion_index = index, %reason, "Suggestion closed, patch skipped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
