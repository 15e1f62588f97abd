use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use uuid::Uuid;

use crate::common::{ImageRole, Job};
use crate::error::PipelineError;

/// Mutable state carried through the stages of one job run. Image buffers
/// are moved out by the stage that consumes them and the produced buffer is
/// moved back in, so no two stages ever hold the same buffer.
pub struct JobContext {
    pub job: Arc<Job>,
    pub run_id: Uuid,
    pub source: Option<RgbImage>,
    pub template: Option<RgbImage>,
    pub working: Option<RgbImage>,
    pub metrics: JobMetrics,
    pub processing_start: Instant,
}

impl JobContext {
    pub fn new(job: Arc<Job>, run_id: Uuid, source: RgbImage, template: RgbImage) -> Self {
        Self {
            job,
            run_id,
            source: Some(source),
            template: Some(template),
            working: None,
            metrics: JobMetrics::new(),
            processing_start: Instant::now(),
        }
    }

    pub fn take_input(&mut self, role: ImageRole) -> Result<RgbImage, PipelineError> {
        let slot = match role {
            ImageRole::Source => &mut self.source,
            ImageRole::Template => &mut self.template,
        };
        slot.take()
            .ok_or_else(|| PipelineError::State(format!("{role} image already consumed")))
    }

    pub fn take_working(&mut self) -> Result<RgbImage, PipelineError> {
        self.working
            .take()
            .ok_or_else(|| PipelineError::State("no working image in context".to_string()))
    }
}

/// Timings collected while a job runs.
#[derive(Debug, Clone, Default)]
pub struct JobMetrics {
    pub identity_transfer_us: u64,
    pub enhancement_us: u64,
    pub candid_effect_us: u64,
    pub total_processing_us: u64,
}

impl JobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_duration(&mut self, stage: StageType, duration_us: u64) {
        match stage {
            StageType::IdentityTransfer => self.identity_transfer_us = duration_us,
            StageType::Enhancement => self.enhancement_us = duration_us,
            StageType::CandidEffect => self.candid_effect_us = duration_us,
        }
    }

    pub fn finalize(&mut self, start_time: Instant) {
        self.total_processing_us = start_time.elapsed().as_micros() as u64;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageType {
    IdentityTransfer,
    Enhancement,
    CandidEffect,
}
