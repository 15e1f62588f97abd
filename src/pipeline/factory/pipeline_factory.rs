use std::sync::Arc;

use super::configuration::PipelineConfiguration;
use crate::common::EffectType;
use crate::pipeline::orchestration::ProcessingPipeline;
use crate::pipeline::services::ServiceRegistry;
use crate::pipeline::steps::{
    CandidEffectStage, CandidEffectStep, EnhancementStep, IdentityTransferStep,
};

/// Assembles the stage chain for one job:
/// identity transfer, enhancement, and candid effect when requested.
pub struct CompositionPipelineFactory;

impl CompositionPipelineFactory {
    pub fn create_pipeline(
        config: &PipelineConfiguration,
        registry: Arc<ServiceRegistry>,
        effect_type: EffectType,
    ) -> ProcessingPipeline {
        let identity = IdentityTransferStep::new(registry.clone(), config.identity_direction)
            .with_face_indices(config.source_face_index, config.target_face_index);
        let enhancement = EnhancementStep::new(registry, config.enhancement_policy);

        let pipeline = ProcessingPipeline::new()
            .add_step(Box::new(identity))
            .add_step(Box::new(enhancement));

        if effect_type.wants_candid_effect() {
            let stage = CandidEffectStage::new(config.effect.clone()).with_seed(config.effect_seed);
            pipeline.add_step(Box::new(CandidEffectStep::new(stage)))
        } else {
            pipeline
        }
    }
}
