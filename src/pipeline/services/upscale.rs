use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Deserialize;

use super::backends::Upscaler;
use super::service_registry::ResourceKind;
use crate::error::ResourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleFilter {
    Nearest,
    Triangle,
    CatmullRom,
    #[default]
    Lanczos3,
}

impl From<ResampleFilter> for FilterType {
    fn from(filter: ResampleFilter) -> Self {
        match filter {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Fixed-factor resampling upscaler with an optional unsharp pass to
/// recover edge contrast lost in interpolation.
#[derive(Debug, Clone)]
pub struct ResampleUpscaler {
    factor: u32,
    filter: ResampleFilter,
    sharpen_sigma: f32,
}

impl ResampleUpscaler {
    pub fn new(factor: u32) -> Self {
        Self {
            factor,
            filter: ResampleFilter::default(),
            sharpen_sigma: 1.0,
        }
    }

    pub fn with_filter(mut self, filter: ResampleFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_sharpen_sigma(mut self, sigma: f32) -> Self {
        self.sharpen_sigma = sigma.max(0.0);
        self
    }
}

impl Upscaler for ResampleUpscaler {
    fn factor(&self) -> u32 {
        self.factor
    }

    fn enhance(&self, image: &RgbImage) -> Result<RgbImage, ResourceError> {
        let failed = |reason: String| ResourceError::Inference {
            kind: ResourceKind::Upscaler,
            reason,
        };
        if self.factor == 0 {
            return Err(failed("magnification factor must be at least 1".to_string()));
        }
        let (width, height) = image.dimensions();
        let out_width = width
            .checked_mul(self.factor)
            .ok_or_else(|| failed(format!("{width}px wide image is too large to upscale")))?;
        let out_height = height
            .checked_mul(self.factor)
            .ok_or_else(|| failed(format!("{height}px tall image is too large to upscale")))?;

        let upscaled = imageops::resize(image, out_width, out_height, self.filter.into());
        if self.sharpen_sigma > 0.0 {
            Ok(imageops::unsharpen(&upscaled, self.sharpen_sigma, 2))
        } else {
            Ok(upscaled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn output_is_input_times_factor() {
        let image = RgbImage::from_pixel(16, 12, Rgb([10, 20, 30]));
        let upscaler = ResampleUpscaler::new(4).with_filter(ResampleFilter::Triangle);
        let out = upscaler.enhance(&image).unwrap();
        assert_eq!(out.dimensions(), (64, 48));
        assert_eq!(upscaler.factor(), 4);
    }

    #[test]
    fn nearest_without_sharpening_replicates_pixels() {
        let image = RgbImage::from_fn(2, 1, |x, _| Rgb([x as u8 * 200, 0, 0]));
        let out = ResampleUpscaler::new(3)
            .with_filter(ResampleFilter::Nearest)
            .with_sharpen_sigma(0.0)
            .enhance(&image)
            .unwrap();
        assert_eq!(out.dimensions(), (6, 3));
        assert_eq!(out.get_pixel(1, 2).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(4, 0).0, [200, 0, 0]);
    }

    #[test]
    fn zero_factor_is_a_backend_failure() {
        let result = ResampleUpscaler::new(0).enhance(&RgbImage::new(4, 4));
        assert!(matches!(result, Err(ResourceError::Inference { .. })));
    }
}
