//! Provider abstraction used by the pipeline runner.
//!
//! Each adapter translates the three pipeline stages into requests for one
//! image-generation back-end. Adapters receive image references (URLs or
//! data URLs), re-encode them per call, run the remote task through a
//! [`TaskExecutor`](crate::executor::TaskExecutor) and return blob-store
//! URLs for every generated image.

use std::sync::Arc;

use async_trait::async_trait;
use drape_core::generation::{ProviderId, Stage};
use drape_core::job::StyleSuggestion;
use drape_core::naming::artifact_name;
use drape_core::prompt::build_stylize_prompt;
use drape_core::types::{JobId, SuggestionIndex};

use crate::error::ProviderError;
use crate::executor::Artifact;
use crate::image::{ImageLoader, ImagePayload};
use crate::storage::BlobStore;

/// Identifies where a stage's artifacts are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageContext {
    pub job_id: JobId,
    pub suggestion_index: SuggestionIndex,
    pub stage: Stage,
    /// Index of the first artifact this call produces. The runner bumps it
    /// when a stage is invoked once per input image so names never collide.
    pub artifact_offset: usize,
}

impl StageContext {
    pub fn new(job_id: JobId, suggestion_index: SuggestionIndex, stage: Stage) -> Self {
        Self {
            job_id,
            suggestion_index,
            stage,
            artifact_offset: 0,
        }
    }

    pub fn with_offset(self, artifact_offset: usize) -> Self {
        Self {
            artifact_offset,
            ..self
        }
    }

    /// Blob name of the `n`-th artifact produced by this call.
    pub fn artifact_name(&self, n: usize, extension: &str) -> String {
        artifact_name(
            self.job_id,
            self.suggestion_index,
            self.stage,
            self.artifact_offset + n,
            extension,
        )
    }
}

/// Inputs for the stylization prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptInput {
    pub custom_prompt: Option<String>,
    pub style: Option<StyleSuggestion>,
    pub occasion: String,
}

impl PromptInput {
    /// The prompt actually sent to the provider.
    pub fn build(&self) -> String {
        build_stylize_prompt(self.custom_prompt.as_deref(), self.style.as_ref(), &self.occasion)
    }
}

/// Stylization result: persisted preview URLs and the prompt that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylizeOutput {
    pub images: Vec<String>,
    pub final_prompt: String,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Place the person into a scene described by the prompt.
    async fn stylize(
        &self,
        ctx: &StageContext,
        human_image: &str,
        prompt: &PromptInput,
    ) -> Result<StylizeOutput, ProviderError>;

    /// Dress the person on `canvas_image` in `garment_image`.
    async fn try_on(
        &self,
        ctx: &StageContext,
        canvas_image: &str,
        garment_image: &str,
    ) -> Result<Vec<String>, ProviderError>;

    /// Restore the face on `generated_image` using `human_image` as reference.
    async fn restore_identity(
        &self,
        ctx: &StageContext,
        generated_image: &str,
        human_image: &str,
    ) -> Result<Vec<String>, ProviderError>;
}

// ---------------------------------------------------------------------------
// Artifact persistence
// ---------------------------------------------------------------------------

/// Copies task artifacts into the blob store under the artifact naming
/// convention.
#[derive(Clone)]
pub struct ArtifactSink {
    loader: Arc<dyn ImageLoader>,
    blobs: Arc<dyn BlobStore>,
}

impl ArtifactSink {
    pub fn new(loader: Arc<dyn ImageLoader>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { loader, blobs }
    }

    /// Fetch an input image for a provider call.
    pub async fn load(&self, url: &str) -> Result<ImagePayload, ProviderError> {
        Ok(self.loader.load(url).await?)
    }

    /// Persist every artifact in order and return their blob URLs.
    pub async fn persist(
        &self,
        ctx: &StageContext,
        artifacts: Vec<Artifact>,
    ) -> Result<Vec<String>, ProviderError> {
        if artifacts.is_empty() {
            return Err(ProviderError::EmptyResult);
        }

        let mut urls = Vec::with_capacity(artifacts.len());
        for (n, artifact) in artifacts.into_iter().enumerate() {
            let payload = match artifact {
                Artifact::Url(url) => self.loader.load(&url).await?,
                Artifact::Inline {
                    bytes,
                    content_type,
                } => ImagePayload::new(bytes, content_type.as_deref()),
            };
            let name = ctx.artifact_name(n, payload.extension());
            let url = self
                .blobs
                .put(&name, payload.bytes, &payload.content_type)
                .await?;
            tracing::debug!(
                job_id = %ctx.job_id,
                suggestion_index = ctx.suggestion_index,
                stage = %ctx.stage,
                blob = %name,
                "Artifact persisted",
            );
            urls.push(url);
        }
        Ok(urls)
    }
}
