pub mod common;
pub mod config;
pub mod error;
pub mod intake;
pub mod pipeline;
pub mod reconcile;
pub mod sink;
pub mod worker;

pub use config::{Configuration, WorkerConfiguration};
pub use error::{AppError, PipelineError};
pub use pipeline::{PipelineOrchestrator, ServiceRegistry};
pub use worker::{Worker, WorkerBuilder, WorkerReport};
