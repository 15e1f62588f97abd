use std::sync::Arc;

use tracing::info;

use super::background::BorderKeyBackgroundRemover;
use super::backends::{BackendFactory, BackgroundRemover, FaceAnalyzer, FaceSwapper, Upscaler};
use super::face_analysis::SkinToneFaceAnalyzer;
use super::face_swap::BlendFaceSwapper;
use super::upscale::{ResampleFilter, ResampleUpscaler};
use crate::error::ResourceError;

/// Factory for the built-in pure-Rust backends.
#[derive(Debug, Clone)]
pub struct CpuBackendFactory {
    upscale_factor: u32,
    upscale_filter: ResampleFilter,
}

impl CpuBackendFactory {
    pub fn new(upscale_factor: u32, upscale_filter: ResampleFilter) -> Self {
        Self {
            upscale_factor,
            upscale_filter,
        }
    }
}

impl Default for CpuBackendFactory {
    fn default() -> Self {
        Self::new(4, ResampleFilter::default())
    }
}

impl BackendFactory for CpuBackendFactory {
    fn face_analyzer(&self) -> Result<Arc<dyn FaceAnalyzer>, ResourceError> {
        Ok(Arc::new(SkinToneFaceAnalyzer::new()))
    }

    fn face_swapper(&self) -> Result<Arc<dyn FaceSwapper>, ResourceError> {
        Ok(Arc::new(BlendFaceSwapper::new()))
    }

    fn upscaler(&self) -> Result<Arc<dyn Upscaler>, ResourceError> {
        info!(
            "Loading resample upscaler ({}x, {:?})",
            self.upscale_factor, self.upscale_filter
        );
        Ok(Arc::new(
            ResampleUpscaler::new(self.upscale_factor).with_filter(self.upscale_filter),
        ))
    }

    fn background_remover(&self) -> Result<Arc<dyn BackgroundRemover>, ResourceError> {
        Ok(Arc::new(BorderKeyBackgroundRemover::new()))
    }
}
