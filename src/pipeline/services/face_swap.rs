use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use super::backends::FaceSwapper;
use super::service_registry::ResourceKind;
use crate::error::ResourceError;
use crate::pipeline::types::{BoundingBox, FaceDescriptor};

/// Region-transfer swapper: the source face is resampled onto the target
/// face box, pulled towards the target's mean colour so the scene lighting
/// carries over, and pasted back through a feathered elliptical mask.
#[derive(Debug, Clone)]
pub struct BlendFaceSwapper {
    /// Width of the soft edge as a fraction of the ellipse radius.
    feather: f32,
    /// 0.0 keeps source colours, 1.0 fully adopts the target's mean colour.
    color_transfer: f32,
}

impl Default for BlendFaceSwapper {
    fn default() -> Self {
        Self {
            feather: 0.25,
            color_transfer: 0.5,
        }
    }
}

impl BlendFaceSwapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_color_transfer(mut self, color_transfer: f32) -> Self {
        self.color_transfer = color_transfer.clamp(0.0, 1.0);
        self
    }

    fn mean_color(image: &RgbImage, region: BoundingBox) -> [f32; 3] {
        let mut sum = [0f64; 3];
        for y in region.y..region.y + region.height {
            for x in region.x..region.x + region.width {
                let pixel = image.get_pixel(x, y).0;
                for c in 0..3 {
                    sum[c] += pixel[c] as f64;
                }
            }
        }
        let count = region.area().max(1) as f64;
        [
            (sum[0] / count) as f32,
            (sum[1] / count) as f32,
            (sum[2] / count) as f32,
        ]
    }

    /// Blend weight for a pixel of the pasted patch: 1 in the core of the
    /// ellipse, falling linearly to 0 across the feather band.
    fn mask_weight(&self, px: u32, py: u32, width: u32, height: u32) -> f32 {
        let nx = (px as f32 + 0.5) / width as f32 * 2.0 - 1.0;
        let ny = (py as f32 + 0.5) / height as f32 * 2.0 - 1.0;
        let distance = (nx * nx + ny * ny).sqrt();
        ((1.0 - distance) / self.feather).clamp(0.0, 1.0)
    }
}

impl FaceSwapper for BlendFaceSwapper {
    fn swap(
        &self,
        target: &RgbImage,
        target_face: &FaceDescriptor,
        source: &RgbImage,
        source_face: &FaceDescriptor,
    ) -> Result<RgbImage, ResourceError> {
        let outside = |what: &str| ResourceError::Inference {
            kind: ResourceKind::FaceSwapper,
            reason: format!("{what} face region lies outside the image"),
        };
        let target_box = target_face
            .bounds
            .clamp_to(target.width(), target.height())
            .ok_or_else(|| outside("target"))?;
        let source_box = source_face
            .bounds
            .clamp_to(source.width(), source.height())
            .ok_or_else(|| outside("source"))?;

        let patch = imageops::crop_imm(
            source,
            source_box.x,
            source_box.y,
            source_box.width,
            source_box.height,
        )
        .to_image();
        let patch = imageops::resize(
            &patch,
            target_box.width,
            target_box.height,
            FilterType::CatmullRom,
        );

        let patch_mean = Self::mean_color(
            &patch,
            BoundingBox::new(0, 0, patch.width(), patch.height()),
        );
        let target_mean = Self::mean_color(target, target_box);
        let shift: Vec<f32> = (0..3)
            .map(|c| (target_mean[c] - patch_mean[c]) * self.color_transfer)
            .collect();

        let mut composite = target.clone();
        for py in 0..target_box.height {
            for px in 0..target_box.width {
                let weight = self.mask_weight(px, py, target_box.width, target_box.height);
                if weight <= 0.0 {
                    continue;
                }
                let (tx, ty) = (target_box.x + px, target_box.y + py);
                let under = composite.get_pixel(tx, ty).0;
                let over = patch.get_pixel(px, py).0;
                let mut blended = [0u8; 3];
                for c in 0..3 {
                    let shifted = (over[c] as f32 + shift[c]).clamp(0.0, 255.0);
                    let value = shifted * weight + under[c] as f32 * (1.0 - weight);
                    blended[c] = value.round().clamp(0.0, 255.0) as u8;
                }
                composite.put_pixel(tx, ty, Rgb(blended));
            }
        }

        Ok(composite)
    }
}
