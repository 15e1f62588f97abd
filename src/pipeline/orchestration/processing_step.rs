use async_trait::async_trait;

use super::job_context::JobContext;
use crate::error::PipelineError;

/// One ordered stage of the composition pipeline.
#[async_trait]
pub trait ProcessingStep: Send + Sync {
    async fn process(&mut self, context: &mut JobContext) -> Result<(), PipelineError>;
    fn name(&self) -> &'static str;
}
