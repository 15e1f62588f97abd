pub mod configuration;
pub mod pipeline_factory;

pub use configuration::PipelineConfiguration;
pub use pipeline_factory::CompositionPipelineFactory;
