use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use image::RgbImage;
use serde::Deserialize;
use tracing::warn;

use crate::error::{PipelineError, ResourceError};
use crate::pipeline::orchestration::inference::run_inference;
use crate::pipeline::orchestration::job_context::{JobContext, StageType};
use crate::pipeline::orchestration::ProcessingStep;
use crate::pipeline::services::{ResourceKind, ServiceRegistry, Upscaler};

/// What happens to a job when the upscaler cannot run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementPolicy {
    /// The job fails with the backend's error.
    #[default]
    Fatal,
    /// The un-enhanced image continues down the pipeline.
    BestEffort,
}

/// Upscales at the backend's fixed factor. Output is a function of the
/// input and the backend's weights; hardware backends may differ in the
/// last bits between devices.
pub struct EnhancementStage {
    upscaler: Arc<dyn Upscaler>,
}

impl EnhancementStage {
    pub fn new(upscaler: Arc<dyn Upscaler>) -> Self {
        Self { upscaler }
    }

    pub fn factor(&self) -> u32 {
        self.upscaler.factor()
    }

    pub fn enhance(&self, image: &RgbImage) -> Result<RgbImage, PipelineError> {
        let enhanced = self.upscaler.enhance(image)?;
        let factor = self.factor();
        let (width, height) = image.dimensions();
        let expected = (width.saturating_mul(factor), height.saturating_mul(factor));
        if enhanced.dimensions() != expected {
            return Err(ResourceError::Inference {
                kind: ResourceKind::Upscaler,
                reason: format!(
                    "expected {}x{} at factor {}, got {}x{}",
                    expected.0,
                    expected.1,
                    factor,
                    enhanced.width(),
                    enhanced.height()
                ),
            }
            .into());
        }
        Ok(enhanced)
    }
}

pub struct EnhancementStep {
    registry: Arc<ServiceRegistry>,
    policy: EnhancementPolicy,
}

impl EnhancementStep {
    pub fn new(registry: Arc<ServiceRegistry>, policy: EnhancementPolicy) -> Self {
        Self { registry, policy }
    }

    async fn run(&self, image: RgbImage) -> (RgbImage, Result<RgbImage, PipelineError>) {
        let upscaler = match self.registry.upscaler().await {
            Ok(upscaler) => upscaler,
            Err(e) => return (image, Err(e.into())),
        };
        let stage = EnhancementStage::new(upscaler);
        let input = Arc::new(image);
        let for_stage = input.clone();
        let result = run_inference(&self.registry, ResourceKind::Upscaler, move || {
            stage.enhance(&for_stage)
        })
        .await;
        // The blocking task has dropped its handle by now, so this is a move.
        let input = Arc::try_unwrap(input).unwrap_or_else(|shared| (*shared).clone());
        (input, result)
    }
}

#[async_trait]
impl ProcessingStep for EnhancementStep {
    async fn process(&mut self, context: &mut JobContext) -> Result<(), PipelineError> {
        let step_start = Instant::now();
        let image = context.take_working()?;

        let (input, result) = self.run(image).await;
        let enhanced = match (result, self.policy) {
            (Ok(enhanced), _) => enhanced,
            (Err(e), EnhancementPolicy::BestEffort) => {
                warn!(
                    "Enhancement skipped for photo {}: {}",
                    context.job.photo_id, e
                );
                input
            }
            (Err(e), EnhancementPolicy::Fatal) => return Err(e),
        };
        context.working = Some(enhanced);

        let duration = step_start.elapsed().as_micros() as u64;
        context
            .metrics
            .record_duration(StageType::Enhancement, duration);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "EnhancementStep"
    }
}
