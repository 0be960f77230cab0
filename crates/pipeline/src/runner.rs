//! Per-suggestion pipeline execution.
//!
//! [`PipelineRunner::run`] drives one `(job_id, suggestion_index)` through
//! its mode's stages:
//!
//! - `tryon-only`: try-on(human, garment)
//! - `simple-scene`: stylize(human) → previews → try-on(each preview)
//! - `advanced-scene`: as `simple-scene`, then identity-restore(each
//!   try-on result against the human image)
//!
//! The run holds the suggestion's execution lock throughout, renewing it
//! between stages and through a heartbeat; a run that finds the lock taken
//! over stops without writing anything further. Every stage
//! error, and any panic inside a stage, ends the suggestion in `failed`
//! with the error text; siblings are unaffected. The cancellation flag is
//! checked at each stage boundary.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use drape_core::generation::{GenerationMode, Stage};
use drape_core::job::{Job, SuggestionPatch, SuggestionStatus, CANCELLED_MESSAGE};
use drape_core::job_events::{
    EVENT_SUGGESTION_FAILED, EVENT_SUGGESTION_PREVIEW, EVENT_SUGGESTION_STARTED,
    EVENT_SUGGESTION_SUCCEEDED,
};
use drape_core::types::{JobId, SuggestionIndex};
use drape_db::{ExecutionLock, JobStore, LockGuard, LockKey};
use drape_events::{EventBus, GalleryOriginals, GalleryRecord, GallerySink, GenerationEvent};
use drape_provider::{PromptInput, ProviderAdapter, ProviderRegistry, StageContext};
use futures::FutureExt;
use serde_json::json;

use crate::error::PipelineError;

/// Why a run did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another run holds the execution lock.
    LockHeld,
    /// The suggestion already succeeded or failed.
    AlreadyTerminal,
    /// The mode needs a prompt and the suggestion has no text yet.
    StyleNotReady,
}

/// Result of one [`PipelineRunner::run`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded { image_urls: Vec<String> },
    Failed { error: String },
    Cancelled,
    Skipped(SkipReason),
}

/// How the stage sequence ended, before the terminal write.
enum StageResult {
    Completed(Vec<String>),
    Cancelled,
}

pub struct PipelineRunner {
    store: Arc<dyn JobStore>,
    lock: Arc<dyn ExecutionLock>,
    providers: Arc<ProviderRegistry>,
    gallery: Arc<dyn GallerySink>,
    bus: Arc<EventBus>,
    lock_ttl: Duration,
}

impl PipelineRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        lock: Arc<dyn ExecutionLock>,
        providers: Arc<ProviderRegistry>,
        gallery: Arc<dyn GallerySink>,
        bus: Arc<EventBus>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            store,
            lock,
            providers,
            gallery,
            bus,
            lock_ttl,
        }
    }

    /// Run the pipeline for one suggestion.
    ///
    /// Returns `Err` only when the job store itself fails; provider and
    /// stage failures are recorded on the suggestion and reported as
    /// [`RunOutcome::Failed`].
    pub async fn run(
        &self,
        job_id: JobId,
        index: SuggestionIndex,
    ) -> Result<RunOutcome, PipelineError> {
        let key = LockKey::new(job_id, index);
        let Some(guard) = LockGuard::acquire(Arc::clone(&self.lock), key, self.lock_ttl).await?
        else {
            tracing::debug!(%job_id, suggestion_index = index, "Run already in progress, skipping");
            return Ok(RunOutcome::Skipped(SkipReason::LockHeld));
        };

        let outcome = self.run_locked(&guard, job_id, index).await;
        guard.release().await;

        match &outcome {
            Ok(RunOutcome::Skipped(reason)) => {
                tracing::debug!(%job_id, suggestion_index = index, ?reason, "Run skipped");
            }
            Ok(RunOutcome::Succeeded { image_urls }) => {
                tracing::info!(%job_id, suggestion_index = index, images = image_urls.len(), "Suggestion succeeded");
            }
            Ok(RunOutcome::Failed { error }) => {
                tracing::warn!(%job_id, suggestion_index = index, %error, "Suggestion failed");
            }
            Ok(RunOutcome::Cancelled) => {
                tracing::info!(%job_id, suggestion_index = index, "Suggestion cancelled");
            }
            Err(e) => {
                tracing::error!(%job_id, suggestion_index = index, error = %e, "Pipeline run aborted");
            }
        }
        outcome
    }

    async fn run_locked(
        &self,
        guard: &LockGuard,
        job_id: JobId,
        index: SuggestionIndex,
    ) -> Result<RunOutcome, PipelineError> {
        let job = self.store.get_required(job_id).await?;
        let suggestion = job.suggestion(index)?;

        if suggestion.status.is_terminal() {
            return Ok(RunOutcome::Skipped(SkipReason::AlreadyTerminal));
        }
        if job.input.mode.needs_prompt()
            && suggestion.style.is_none()
            && job.input.effective_custom_prompt().is_none()
        {
            return Ok(RunOutcome::Skipped(SkipReason::StyleNotReady));
        }
        if job.cancel_requested {
            return self.finish_cancelled(job_id, index).await;
        }

        let adapter = match self.providers.get(job.input.provider) {
            Ok(adapter) => adapter,
            Err(e) => return self.finish_failed(job_id, index, e.to_string()).await,
        };

        // A suggestion found in flight here was left behind by a run whose
        // lock expired; it restarts, reusing previews if they were written.
        if suggestion.status == SuggestionStatus::Pending {
            self.store
                .update_suggestion(job_id, index, &SuggestionPatch::started())
                .await?;
        } else {
            tracing::warn!(
                %job_id,
                suggestion_index = index,
                status = suggestion.status.as_str(),
                "Resuming suggestion left in flight by an expired run",
            );
        }
        self.bus.publish(
            GenerationEvent::new(EVENT_SUGGESTION_STARTED)
                .for_suggestion(job_id, index)
                .with_payload(json!({ "mode": job.input.mode.as_str(), "provider": adapter.id().as_str() })),
        );

        let stages = AssertUnwindSafe(self.execute_stages(guard, &job, index, adapter.as_ref()))
            .catch_unwind()
            .await;

        // A run that lost its lock leaves the suggestion to the new holder.
        self.ensure_held(guard).await?;

        match stages {
            Ok(Ok(StageResult::Completed(image_urls))) => {
                self.finish_succeeded(&job, index, image_urls).await
            }
            Ok(Ok(StageResult::Cancelled)) => self.finish_cancelled(job_id, index).await,
            Ok(Err(e)) => self.finish_failed(job_id, index, e.to_string()).await,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                self.finish_failed(job_id, index, format!("Generation crashed: {message}"))
                    .await
            }
        }
    }

    /// Run the mode's stages in order. Returns the final image URLs.
    async fn execute_stages(
        &self,
        guard: &LockGuard,
        job: &Job,
        index: SuggestionIndex,
        adapter: &dyn ProviderAdapter,
    ) -> Result<StageResult, PipelineError> {
        let job_id = job.job_id;
        let input = &job.input;
        let suggestion = job.suggestion(index)?;
        let ctx = |stage| StageContext::new(job_id, index, stage);

        // Stylize
        let canvases = if input.mode.needs_prompt() {
            if !suggestion.intermediate_image_urls.is_empty() {
                suggestion.intermediate_image_urls.clone()
            } else {
                let prompt = PromptInput {
                    custom_prompt: input.effective_custom_prompt().map(str::to_string),
                    style: suggestion.style.clone(),
                    occasion: input.occasion.clone(),
                };
                tracing::debug!(%job_id, suggestion_index = index, stage = %Stage::Stylize, "Stage started");
                let styled = adapter
                    .stylize(&ctx(Stage::Stylize), &input.human_image_url, &prompt)
                    .await?;
                self.ensure_held(guard).await?;
                self.store
                    .update_suggestion(
                        job_id,
                        index,
                        &SuggestionPatch::previews(styled.final_prompt, styled.images.clone()),
                    )
                    .await?;
                self.bus.publish(
                    GenerationEvent::new(EVENT_SUGGESTION_PREVIEW)
                        .for_suggestion(job_id, index)
                        .with_payload(json!({ "images": styled.images.len() })),
                );
                styled.images
            }
        } else {
            vec![input.human_image_url.clone()]
        };

        // Try-on
        self.ensure_held(guard).await?;
        if self.cancel_requested(job_id).await? {
            return Ok(StageResult::Cancelled);
        }
        tracing::debug!(%job_id, suggestion_index = index, stage = %Stage::TryOn, canvases = canvases.len(), "Stage started");
        let mut images = Vec::new();
        for canvas in &canvases {
            let urls = adapter
                .try_on(
                    &ctx(Stage::TryOn).with_offset(images.len()),
                    canvas,
                    &input.garment_image_url,
                )
                .await?;
            images.extend(urls);
        }

        // Identity restore
        if input.mode == GenerationMode::AdvancedScene {
            self.ensure_held(guard).await?;
            if self.cancel_requested(job_id).await? {
                return Ok(StageResult::Cancelled);
            }
            tracing::debug!(%job_id, suggestion_index = index, stage = %Stage::IdentityRestore, "Stage started");
            let mut restored = Vec::new();
            for image in &images {
                let urls = adapter
                    .restore_identity(
                        &ctx(Stage::IdentityRestore).with_offset(restored.len()),
                        image,
                        &input.human_image_url,
                    )
                    .await?;
                restored.extend(urls);
            }
            images = restored;
        }

        Ok(StageResult::Completed(images))
    }

    /// Extend the execution lock, failing if another run has taken it.
    async fn ensure_held(&self, guard: &LockGuard) -> Result<(), PipelineError> {
        if guard.renew().await? {
            Ok(())
        } else {
            let key = guard.key();
            Err(PipelineError::LockLost {
                job_id: key.job_id,
                suggestion_index: key.suggestion_index,
            })
        }
    }

    async fn cancel_requested(&self, job_id: JobId) -> Result<bool, PipelineError> {
        Ok(self.store.get_required(job_id).await?.cancel_requested)
    }

    // ---- terminal transitions ----

    async fn finish_succeeded(
        &self,
        job: &Job,
        index: SuggestionIndex,
        image_urls: Vec<String>,
    ) -> Result<RunOutcome, PipelineError> {
        let job_id = job.job_id;
        let updated = self
            .store
            .update_suggestion(job_id, index, &SuggestionPatch::succeeded(image_urls.clone()))
            .await?;
        self.bus.publish(
            GenerationEvent::new(EVENT_SUGGESTION_SUCCEEDED)
                .for_suggestion(job_id, index)
                .with_payload(json!({ "images": image_urls.len(), "job_status": updated.status.as_str() })),
        );

        let suggestion = updated.suggestion(index)?;
        let originals = GalleryOriginals {
            human_image_url: job.input.human_image_url.clone(),
            garment_image_url: job.input.garment_image_url.clone(),
        };
        for (n, image_url) in image_urls.iter().enumerate() {
            let record = GalleryRecord {
                id: format!("{job_id}-{index}-{n}"),
                image_url: image_url.clone(),
                style: suggestion.style.clone(),
                timestamp: Utc::now(),
                originals: originals.clone(),
                final_prompt: suggestion.final_prompt.clone(),
            };
            if let Err(e) = self.gallery.record(&record).await {
                tracing::warn!(
                    %job_id,
                    suggestion_index = index,
                    record_id = %record.id,
                    error = %e,
                    "Gallery write failed",
                );
            }
        }

        Ok(RunOutcome::Succeeded { image_urls })
    }

    async fn finish_failed(
        &self,
        job_id: JobId,
        index: SuggestionIndex,
        error: String,
    ) -> Result<RunOutcome, PipelineError> {
        let error = if error.trim().is_empty() {
            "Generation failed".to_string()
        } else {
            error
        };
        self.store
            .update_suggestion(job_id, index, &SuggestionPatch::failed(error.clone()))
            .await?;
        self.bus.publish(
            GenerationEvent::new(EVENT_SUGGESTION_FAILED)
                .for_suggestion(job_id, index)
                .with_payload(json!({ "error": error })),
        );
        Ok(RunOutcome::Failed { error })
    }

    async fn finish_cancelled(
        &self,
        job_id: JobId,
        index: SuggestionIndex,
    ) -> Result<RunOutcome, PipelineError> {
        self.store
            .update_suggestion(job_id, index, &SuggestionPatch::failed(CANCELLED_MESSAGE))
            .await?;
        self.bus.publish(
            GenerationEvent::new(EVENT_SUGGESTION_FAILED)
                .for_suggestion(job_id, index)
                .with_payload(json!({ "error": CANCELLED_MESSAGE, "cancelled": true })),
        );
        Ok(RunOutcome::Cancelled)
    }
}
