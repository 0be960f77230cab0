//! Adapter for the general multimodal generative service.
//!
//! Requests are a list of parts: an instruction text followed by inline
//! base64 images with their MIME types. Besides the three pipeline stages
//! the adapter exposes [`MultimodalAdapter::compose_final`], a single call
//! that composites a garment onto a canvas under a free-form instruction;
//! its `try_on` is that call with the fixed try-on instruction.

use async_trait::async_trait;
use drape_core::generation::ProviderId;
use drape_core::prompt::{truncate_prompt, IDENTITY_RESTORE_INSTRUCTION, TRYON_INSTRUCTION};
use serde_json::{json, Value};

use crate::adapter::{ArtifactSink, PromptInput, ProviderAdapter, StageContext, StylizeOutput};
use crate::error::ProviderError;
use crate::executor::TaskExecutor;
use crate::image::ImagePayload;

pub struct MultimodalAdapter {
    executor: TaskExecutor,
    sink: ArtifactSink,
}

fn inline_part(image: &ImagePayload) -> Value {
    json!({
        "inline_data": {
            "mime_type": image.content_type,
            "data": image.to_base64(),
        }
    })
}

fn image_request(instruction: &str, images: &[&ImagePayload]) -> Value {
    let mut parts = Vec::with_capacity(images.len() + 1);
    parts.push(json!({ "text": instruction }));
    parts.extend(images.iter().map(|image| inline_part(image)));
    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "response_modalities": ["IMAGE"],
    })
}

impl MultimodalAdapter {
    pub fn new(executor: TaskExecutor, sink: ArtifactSink) -> Self {
        Self { executor, sink }
    }

    /// Composite `garment_image` onto `canvas_image` following `instruction`.
    pub async fn compose_final(
        &self,
        ctx: &StageContext,
        canvas_image: &str,
        garment_image: &str,
        instruction: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let canvas = self.sink.load(canvas_image).await?;
        let garment = self.sink.load(garment_image).await?;

        let request = image_request(&truncate_prompt(instruction), &[&canvas, &garment]);
        let artifacts = self.executor.run(&request).await?;
        self.sink.persist(ctx, artifacts).await
    }
}

#[async_trait]
impl ProviderAdapter for MultimodalAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Multimodal
    }

    async fn stylize(
        &self,
        ctx: &StageContext,
        human_image: &str,
        prompt: &PromptInput,
    ) -> Result<StylizeOutput, ProviderError> {
        let human = self.sink.load(human_image).await?;
        let final_prompt = prompt.build();

        let request = image_request(&final_prompt, &[&human]);
        let artifacts = self.executor.run(&request).await?;
        let images = self.sink.persist(ctx, artifacts).await?;

        Ok(StylizeOutput {
            images,
            final_prompt,
        })
    }

    async fn try_on(
        &self,
        ctx: &StageContext,
        canvas_image: &str,
        garment_image: &str,
    ) -> Result<Vec<String>, ProviderError> {
        self.compose_final(ctx, canvas_image, garment_image, TRYON_INSTRUCTION)
            .await
    }

    async fn restore_identity(
        &self,
        ctx: &StageContext,
        generated_image: &str,
        human_image: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let generated = self.sink.load(generated_image).await?;
        let reference = self.sink.load(human_image).await?;

        let request = image_request(IDENTITY_RESTORE_INSTRUCTION, &[&generated, &reference]);
        let artifacts = self.executor.run(&request).await?;
        self.sink.persist(ctx, artifacts).await
    }
}
