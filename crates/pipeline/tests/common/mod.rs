//! Shared fixtures for pipeline integration tests.
//!
//! Everything runs against the in-memory store, lock and gallery with a
//! scripted provider adapter, so no network or database is needed.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use drape_core::generation::{GenerationMode, ProviderId};
use drape_core::job::{Job, JobInput, StyleSuggestion, SuggestionPatch};
use drape_core::types::{JobId, SuggestionIndex};
use drape_db::{JobStore, MemoryExecutionLock, MemoryJobStore};
use drape_events::{EventBus, MemoryGallery};
use drape_pipeline::PipelineRunner;
use drape_provider::{
    PromptInput, ProviderAdapter, ProviderError, ProviderRegistry, StageContext, StylizeOutput,
};

pub const HUMAN_URL: &str = "https://img.test/person.jpg";
pub const GARMENT_URL: &str = "https://img.test/jacket.jpg";

// ---------------------------------------------------------------------------
// Scripted adapter
// ---------------------------------------------------------------------------

/// Provider adapter returning `memory://` URLs named after the artifact
/// convention, with per-suggestion failure injection.
pub struct FakeAdapter {
    previews_per_stylize: usize,
    fail_try_on_for: HashSet<SuggestionIndex>,
    panic_stylize_for: HashSet<SuggestionIndex>,
    cancel_during_stylize: Option<Arc<dyn JobStore>>,
    stylize_delay: Option<Duration>,
    stylize_calls: AtomicUsize,
    try_on_calls: AtomicUsize,
    restore_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self {
            previews_per_stylize: 1,
            fail_try_on_for: HashSet::new(),
            panic_stylize_for: HashSet::new(),
            cancel_during_stylize: None,
            stylize_delay: None,
            stylize_calls: AtomicUsize::new(0),
            try_on_calls: AtomicUsize::new(0),
            restore_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_previews(mut self, n: usize) -> Self {
        self.previews_per_stylize = n;
        self
    }

    pub fn failing_try_on(mut self, index: SuggestionIndex) -> Self {
        self.fail_try_on_for.insert(index);
        self
    }

    pub fn panicking_stylize(mut self, index: SuggestionIndex) -> Self {
        self.panic_stylize_for.insert(index);
        self
    }

    /// Flag the job as cancelled while stylization is running.
    pub fn cancelling_during_stylize(mut self, store: Arc<dyn JobStore>) -> Self {
        self.cancel_during_stylize = Some(store);
        self
    }

    /// Make every stylization take `delay`, like a slow remote task.
    pub fn slow_stylize(mut self, delay: Duration) -> Self {
        self.stylize_delay = Some(delay);
        self
    }

    pub fn stylize_calls(&self) -> usize {
        self.stylize_calls.load(Ordering::SeqCst)
    }

    pub fn try_on_calls(&self) -> usize {
        self.try_on_calls.load(Ordering::SeqCst)
    }

    pub fn restore_calls(&self) -> usize {
        self.restore_calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

fn memory_url(ctx: &StageContext, n: usize) -> String {
    format!("memory://{}", ctx.artifact_name(n, "png"))
}

#[async_trait]
impl ProviderAdapter for FakeAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::TryonService
    }

    async fn stylize(
        &self,
        ctx: &StageContext,
        _human_image: &str,
        prompt: &PromptInput,
    ) -> Result<StylizeOutput, ProviderError> {
        self.stylize_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_stylize_for.contains(&ctx.suggestion_index) {
            panic!("decoder exploded");
        }
        if let Some(delay) = self.stylize_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(store) = &self.cancel_during_stylize {
            store
                .request_cancel(ctx.job_id)
                .await
                .map_err(|e| ProviderError::Transient(e.to_string()))?;
        }
        let final_prompt = prompt.build();
        self.prompts.lock().unwrap().push(final_prompt.clone());
        Ok(StylizeOutput {
            images: (0..self.previews_per_stylize)
                .map(|n| memory_url(ctx, n))
                .collect(),
            final_prompt,
        })
    }

    async fn try_on(
        &self,
        ctx: &StageContext,
        _canvas_image: &str,
        _garment_image: &str,
    ) -> Result<Vec<String>, ProviderError> {
        self.try_on_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_try_on_for.contains(&ctx.suggestion_index) {
            return Err(ProviderError::TaskFailed("garment not detected".into()));
        }
        Ok(vec![memory_url(ctx, 0)])
    }

    async fn restore_identity(
        &self,
        ctx: &StageContext,
        _generated_image: &str,
        _human_image: &str,
    ) -> Result<Vec<String>, ProviderError> {
        self.restore_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![memory_url(ctx, 0)])
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub lock: Arc<MemoryExecutionLock>,
    pub gallery: Arc<MemoryGallery>,
    pub bus: Arc<EventBus>,
    pub adapter: Arc<FakeAdapter>,
    pub runner: Arc<PipelineRunner>,
}

impl Harness {
    pub fn new(adapter: FakeAdapter) -> Self {
        Self::with_store(Arc::new(MemoryJobStore::new()), adapter)
    }

    /// Use a store created up front, e.g. one the adapter also holds.
    pub fn with_store(store: Arc<MemoryJobStore>, adapter: FakeAdapter) -> Self {
        Self::build(store, adapter, Duration::from_secs(60))
    }

    /// Use a custom execution lock TTL.
    pub fn with_lock_ttl(adapter: FakeAdapter, lock_ttl: Duration) -> Self {
        Self::build(Arc::new(MemoryJobStore::new()), adapter, lock_ttl)
    }

    fn build(store: Arc<MemoryJobStore>, adapter: FakeAdapter, lock_ttl: Duration) -> Self {
        let lock = Arc::new(MemoryExecutionLock::new());
        let gallery = Arc::new(MemoryGallery::new());
        let bus = Arc::new(EventBus::default());
        let adapter = Arc::new(adapter);

        let mut registry = ProviderRegistry::new(ProviderId::TryonService);
        registry.register(adapter.clone());

        let runner = Arc::new(PipelineRunner::new(
            store.clone(),
            lock.clone(),
            Arc::new(registry),
            gallery.clone(),
            bus.clone(),
            lock_ttl,
        ));

        Self {
            store,
            lock,
            gallery,
            bus,
            adapter,
            runner,
        }
    }

    /// Persist a job whose suggestions already carry advisor text.
    pub async fn seed_job(&self, input: JobInput, count: usize) -> Job {
        let job = Job::new(input, count, Utc::now());
        self.store.create(&job).await.unwrap();
        for index in 0..count {
            self.store
                .update_suggestion(job.job_id, index, &SuggestionPatch::style(style(index)))
                .await
                .unwrap();
        }
        self.get(job.job_id).await
    }

    /// Persist a job without any suggestion text.
    pub async fn seed_bare_job(&self, input: JobInput, count: usize) -> Job {
        let job = Job::new(input, count, Utc::now());
        self.store.create(&job).await.unwrap();
        job
    }

    pub async fn get(&self, job_id: JobId) -> Job {
        self.store.get_required(job_id).await.unwrap()
    }
}

pub fn input(mode: GenerationMode) -> JobInput {
    JobInput {
        human_image_url: HUMAN_URL.into(),
        garment_image_url: GARMENT_URL.into(),
        mode,
        occasion: "Friend's wedding".into(),
        user_profile: None,
        custom_prompt: None,
        provider: None,
    }
}

pub fn style(index: SuggestionIndex) -> StyleSuggestion {
    StyleSuggestion {
        title: format!("Look {index}"),
        outfit_description: "Linen suit in sand tones".into(),
        scene_prompt: "Garden terrace at golden hour".into(),
        notes: None,
    }
}
