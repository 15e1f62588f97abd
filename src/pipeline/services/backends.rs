use std::sync::Arc;

use image::{GrayImage, Luma, RgbImage, RgbaImage};

use crate::error::ResourceError;
use crate::pipeline::types::FaceDescriptor;

/// Face detector. Detection ordering is backend-defined and may differ
/// between calls on the same image.
pub trait FaceAnalyzer: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceDescriptor>, ResourceError>;
}

/// Pastes the identity of `source_face` onto `target_face`, keeping the
/// target's pose and lighting. Seam blending happens inside the swapper.
pub trait FaceSwapper: Send + Sync {
    fn swap(
        &self,
        target: &RgbImage,
        target_face: &FaceDescriptor,
        source: &RgbImage,
        source_face: &FaceDescriptor,
    ) -> Result<RgbImage, ResourceError>;
}

/// Super-resolution backend with a fixed magnification factor.
pub trait Upscaler: Send + Sync {
    fn factor(&self) -> u32;
    fn enhance(&self, image: &RgbImage) -> Result<RgbImage, ResourceError>;
}

pub trait BackgroundRemover: Send + Sync {
    fn remove_background(&self, image: &RgbImage) -> Result<RgbaImage, ResourceError>;

    /// Binary foreground mask (255 = foreground) derived from the cut-out alpha.
    fn foreground_mask(&self, image: &RgbImage) -> Result<GrayImage, ResourceError> {
        let cutout = self.remove_background(image)?;
        Ok(GrayImage::from_fn(cutout.width(), cutout.height(), |x, y| {
            let alpha = cutout.get_pixel(x, y).0[3];
            Luma([if alpha > 127 { 255 } else { 0 }])
        }))
    }
}

/// Builds the expensive backends. Called at most once per resource kind per
/// process by the service registry; constructors may block.
pub trait BackendFactory: Send + Sync {
    fn face_analyzer(&self) -> Result<Arc<dyn FaceAnalyzer>, ResourceError>;
    fn face_swapper(&self) -> Result<Arc<dyn FaceSwapper>, ResourceError>;
    fn upscaler(&self) -> Result<Arc<dyn Upscaler>, ResourceError>;
    fn background_remover(&self) -> Result<Arc<dyn BackgroundRemover>, ResourceError>;
}
