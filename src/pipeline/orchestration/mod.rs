pub mod artifact;
pub mod inference;
pub mod job_context;
pub mod pipeline_orchestrator;
pub mod processing_pipeline;
pub mod processing_step;

pub use artifact::ArtifactWriter;
pub use job_context::{JobContext, JobMetrics, StageType};
pub use pipeline_orchestrator::{OrchestratorService, PipelineOrchestrator};
pub use processing_pipeline::ProcessingPipeline;
pub use processing_step::ProcessingStep;
