use image::imageops::{self, FilterType};
use image::RgbImage;

use super::backends::FaceAnalyzer;
use crate::error::ResourceError;
use crate::pipeline::types::{BoundingBox, FaceDescriptor};

/// CPU face detector that needs no model weights.
///
/// The image is reduced to at most `analysis_size` pixels on its long side,
/// every pixel is classified with an RGB skin-tone rule, and 4-connected skin
/// regions are grouped. Regions that are too small, too elongated or too
/// sparse are dropped. Faces are reported largest first.
#[derive(Debug, Clone)]
pub struct SkinToneFaceAnalyzer {
    analysis_size: u32,
    min_area_fraction: f32,
    min_fill_ratio: f32,
    max_aspect_ratio: f32,
}

impl Default for SkinToneFaceAnalyzer {
    fn default() -> Self {
        Self {
            analysis_size: 160,
            min_area_fraction: 0.004,
            min_fill_ratio: 0.35,
            max_aspect_ratio: 2.2,
        }
    }
}

struct Region {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    pixels: u64,
    sum: [u64; 3],
}

impl SkinToneFaceAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_skin(r: u8, g: u8, b: u8) -> bool {
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        r > 95 && g > 40 && b > 20 && max - min > 15 && r.abs_diff(g) > 15 && r > g && r > b
    }

    fn regions(&self, image: &RgbImage) -> Vec<Region> {
        let (width, height) = image.dimensions();
        let mut visited = vec![false; (width * height) as usize];
        let mut regions = Vec::new();
        let mut stack = Vec::new();

        for y in 0..height {
            for x in 0..width {
                let idx = (y * width + x) as usize;
                if visited[idx] {
                    continue;
                }
                visited[idx] = true;
                let [r, g, b] = image.get_pixel(x, y).0;
                if !Self::is_skin(r, g, b) {
                    continue;
                }

                let mut region = Region {
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                    pixels: 0,
                    sum: [0; 3],
                };
                stack.push((x, y));
                while let Some((cx, cy)) = stack.pop() {
                    let [r, g, b] = image.get_pixel(cx, cy).0;
                    region.pixels += 1;
                    region.sum[0] += r as u64;
                    region.sum[1] += g as u64;
                    region.sum[2] += b as u64;
                    region.min_x = region.min_x.min(cx);
                    region.min_y = region.min_y.min(cy);
                    region.max_x = region.max_x.max(cx);
                    region.max_y = region.max_y.max(cy);

                    let neighbours = [
                        (cx.wrapping_sub(1), cy),
                        (cx + 1, cy),
                        (cx, cy.wrapping_sub(1)),
                        (cx, cy + 1),
                    ];
                    for (nx, ny) in neighbours {
                        if nx >= width || ny >= height {
                            continue;
                        }
                        let nidx = (ny * width + nx) as usize;
                        if visited[nidx] {
                            continue;
                        }
                        let [r, g, b] = image.get_pixel(nx, ny).0;
                        if Self::is_skin(r, g, b) {
                            visited[nidx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
                regions.push(region);
            }
        }
        regions
    }
}

impl FaceAnalyzer for SkinToneFaceAnalyzer {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceDescriptor>, ResourceError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let long_side = width.max(height);
        let scale = if long_side > self.analysis_size {
            self.analysis_size as f32 / long_side as f32
        } else {
            1.0
        };
        let small;
        let analysed = if scale < 1.0 {
            let sw = ((width as f32 * scale).round() as u32).max(1);
            let sh = ((height as f32 * scale).round() as u32).max(1);
            small = imageops::resize(image, sw, sh, FilterType::Triangle);
            &small
        } else {
            image
        };

        let total = analysed.width() as f32 * analysed.height() as f32;
        let min_pixels = (total * self.min_area_fraction).max(4.0) as u64;

        let mut regions: Vec<Region> = self
            .regions(analysed)
            .into_iter()
            .filter(|region| {
                let w = (region.max_x - region.min_x + 1) as f32;
                let h = (region.max_y - region.min_y + 1) as f32;
                let aspect = w.max(h) / w.min(h);
                let fill = region.pixels as f32 / (w * h);
                region.pixels >= min_pixels
                    && aspect <= self.max_aspect_ratio
                    && fill >= self.min_fill_ratio
            })
            .collect();

        regions.sort_by(|a, b| {
            b.pixels
                .cmp(&a.pixels)
                .then(a.min_y.cmp(&b.min_y))
                .then(a.min_x.cmp(&b.min_x))
        });

        let faces = regions
            .into_iter()
            .filter_map(|region| {
                let x = (region.min_x as f32 / scale).floor() as u32;
                let y = (region.min_y as f32 / scale).floor() as u32;
                let w = ((region.max_x - region.min_x + 1) as f32 / scale).ceil() as u32;
                let h = ((region.max_y - region.min_y + 1) as f32 / scale).ceil() as u32;
                let bounds = BoundingBox::new(x, y, w, h).clamp_to(width, height)?;

                let pixels = region.pixels as f32;
                let embedding = region
                    .sum
                    .iter()
                    .map(|channel| *channel as f32 / pixels / 255.0)
                    .collect();
                let box_area = ((region.max_x - region.min_x + 1)
                    * (region.max_y - region.min_y + 1)) as f32;
                let confidence = (pixels / box_area).clamp(0.0, 1.0);
                Some(FaceDescriptor::from_bounds(bounds, embedding, confidence))
            })
            .collect();

        Ok(faces)
    }
}
