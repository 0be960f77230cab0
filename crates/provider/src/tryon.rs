//! Adapter for the fast single-pass try-on / stylization service.
//!
//! The service accepts images as data URIs in a JSON body. One task is
//! submitted per stage call.

use async_trait::async_trait;
use drape_core::generation::ProviderId;
use serde_json::json;

use crate::adapter::{ArtifactSink, PromptInput, ProviderAdapter, StageContext, StylizeOutput};
use crate::error::ProviderError;
use crate::executor::TaskExecutor;

pub struct TryOnServiceAdapter {
    executor: TaskExecutor,
    sink: ArtifactSink,
}

impl TryOnServiceAdapter {
    pub fn new(executor: TaskExecutor, sink: ArtifactSink) -> Self {
        Self { executor, sink }
    }
}

#[async_trait]
impl ProviderAdapter for TryOnServiceAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::TryonService
    }

    async fn stylize(
        &self,
        ctx: &StageContext,
        human_image: &str,
        prompt: &PromptInput,
    ) -> Result<StylizeOutput, ProviderError> {
        let human = self.sink.load(human_image).await?;
        let final_prompt = prompt.build();

        let request = json!({
            "task": "stylize",
            "prompt": final_prompt,
            "image": human.to_data_uri(),
            "num_images": 1,
        });
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
        let model = self.sink.load(canvas_image).await?;
        let garment = self.sink.load(garment_image).await?;

        let request = json!({
            "task": "tryon",
            "model_image": model.to_data_uri(),
            "garment_image": garment.to_data_uri(),
        });
        let artifacts = self.executor.run(&request).await?;
        self.sink.persist(ctx, artifacts).await
    }

    async fn restore_identity(
        &self,
        ctx: &StageContext,
        generated_image: &str,
        human_image: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let generated = self.sink.load(generated_image).await?;
        let reference = self.sink.load(human_image).await?;

        let request = json!({
            "task": "face_restore",
            "image": generated.to_data_uri(),
            "reference_image": reference.to_data_uri(),
        });
        let artifacts = self.executor.run(&request).await?;
        self.sink.persist(ctx, artifacts).await
    }
}
