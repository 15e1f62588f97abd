use serde::Deserialize;

use crate::pipeline::services::ResampleFilter;
use crate::pipeline::steps::{CandidEffectConfig, EnhancementPolicy, IdentityDirection};

/// Configuration options for the composition pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfiguration {
    pub enhancement_factor: u32,
    pub enhancement_filter: ResampleFilter,
    pub enhancement_policy: EnhancementPolicy,
    pub identity_direction: IdentityDirection,
    pub source_face_index: usize,
    pub target_face_index: usize,
    pub jpeg_quality: u8,
    pub effect: CandidEffectConfig,
    /// Fixed noise seed; leave unset in production so every run differs.
    pub effect_seed: Option<u64>,
}

impl Default for PipelineConfiguration {
    fn default() -> Self {
        Self {
            enhancement_factor: 4,
            enhancement_filter: ResampleFilter::Lanczos3,
            enhancement_policy: EnhancementPolicy::Fatal,
            identity_direction: IdentityDirection::UserOntoTemplate,
            source_face_index: 0,
            target_face_index: 0,
            jpeg_quality: 95,
            effect: CandidEffectConfig::default(),
            effect_seed: None,
        }
    }
}

impl PipelineConfiguration {
    /// Create configuration with reproducible output, for tests and previews
    pub fn deterministic(seed: u64) -> Self {
        Self {
            effect_seed: Some(seed),
            ..Self::default()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.enhancement_factor == 0 {
            return Err("Enhancement factor must be greater than 0".to_string());
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }

        self.effect.validate()
    }
}
