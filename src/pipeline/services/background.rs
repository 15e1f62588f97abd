use image::{Rgba, RgbImage, RgbaImage};

use super::backends::BackgroundRemover;
use crate::error::ResourceError;

/// Keys out the background by estimating its colour from the image border
/// and fading pixels to transparent as they approach that colour.
#[derive(Debug, Clone)]
pub struct BorderKeyBackgroundRemover {
    tolerance: f32,
    softness: f32,
}

impl Default for BorderKeyBackgroundRemover {
    fn default() -> Self {
        Self {
            tolerance: 40.0,
            softness: 20.0,
        }
    }
}

impl BorderKeyBackgroundRemover {
    pub fn new() -> Self {
        Self::default()
    }

    fn border_color(image: &RgbImage) -> [f32; 3] {
        let (width, height) = image.dimensions();
        let mut sum = [0f64; 3];
        let mut count = 0f64;
        for y in 0..height {
            for x in 0..width {
                if x != 0 && y != 0 && x != width - 1 && y != height - 1 {
                    continue;
                }
                let pixel = image.get_pixel(x, y).0;
                for c in 0..3 {
                    sum[c] += pixel[c] as f64;
                }
                count += 1.0;
            }
        }
        let count = count.max(1.0);
        [
            (sum[0] / count) as f32,
            (sum[1] / count) as f32,
            (sum[2] / count) as f32,
        ]
    }
}

impl BackgroundRemover for BorderKeyBackgroundRemover {
    fn remove_background(&self, image: &RgbImage) -> Result<RgbaImage, ResourceError> {
        let key = Self::border_color(image);
        Ok(RgbaImage::from_fn(image.width(), image.height(), |x, y| {
            let [r, g, b] = image.get_pixel(x, y).0;
            let distance = ((r as f32 - key[0]).powi(2)
                + (g as f32 - key[1]).powi(2)
                + (b as f32 - key[2]).powi(2))
            .sqrt();
            let alpha = ((distance - self.tolerance) / self.softness).clamp(0.0, 1.0);
            Rgba([r, g, b, (alpha * 255.0).round() as u8])
        }))
    }
}
