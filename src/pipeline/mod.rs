pub mod factory;
pub mod orchestration;
pub mod services;
pub mod steps;
pub mod types;

pub use factory::{CompositionPipelineFactory, PipelineConfiguration};
pub use orchestration::{OrchestratorService, PipelineOrchestrator};
pub use services::ServiceRegistry;
pub use types::{ErrorKind, OutcomeMessage, OutcomeStatus, PipelineOutcome};
