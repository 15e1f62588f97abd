use std::time::Instant;

use async_trait::async_trait;
use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::error::PipelineError;
use crate::pipeline::orchestration::inference::run_compute;
use crate::pipeline::orchestration::job_context::{JobContext, StageType};
use crate::pipeline::orchestration::ProcessingStep;

/// Parameters of the street-candid filter chain. A value of zero (or less)
/// switches the corresponding filter off.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CandidEffectConfig {
    pub motion_blur_radius: i32,
    /// Noise standard deviation as a fraction of full intensity.
    pub noise_factor: f32,
    /// Edge darkening in [0, 1].
    pub vignette_strength: f32,
    /// Channel offset added to red and removed from blue.
    pub warmth: i32,
}

impl Default for CandidEffectConfig {
    fn default() -> Self {
        Self {
            motion_blur_radius: 3,
            noise_factor: 0.03,
            vignette_strength: 0.3,
            warmth: 5,
        }
    }
}

impl CandidEffectConfig {
    pub fn off() -> Self {
        Self {
            motion_blur_radius: 0,
            noise_factor: 0.0,
            vignette_strength: 0.0,
            warmth: 0,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.vignette_strength) {
            return Err("Vignette strength must be between 0.0 and 1.0".to_string());
        }
        if !self.noise_factor.is_finite() || self.noise_factor < 0.0 {
            return Err("Noise factor must be a non-negative number".to_string());
        }
        Ok(())
    }
}

/// Simulates an unposed street photograph. Filters run in the fixed order
/// blur, noise, vignette, warmth; changing the order changes the output.
#[derive(Debug, Clone)]
pub struct CandidEffectStage {
    config: CandidEffectConfig,
    seed: Option<u64>,
}

impl CandidEffectStage {
    pub fn new(config: CandidEffectConfig) -> Self {
        Self { config, seed: None }
    }

    /// Fixes the noise seed. Without one every call draws fresh noise.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn apply(&self, image: RgbImage) -> RgbImage {
        let seed = self.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut image = image;

        if self.config.motion_blur_radius > 0 {
            image = motion_blur(&image, self.config.motion_blur_radius as u32);
        }
        if self.config.noise_factor > 0.0 {
            add_noise(&mut image, self.config.noise_factor, &mut rng);
        }
        if self.config.vignette_strength > 0.0 {
            vignette(&mut image, self.config.vignette_strength.min(1.0));
        }
        if self.config.warmth > 0 {
            warm(&mut image, self.config.warmth);
        }
        image
    }
}

/// Reflects an out-of-range index back into `0..len` without repeating the
/// edge sample (`dcb|abcd|cba`).
fn reflect_101(mut index: i64, len: i64) -> usize {
    if len == 1 {
        return 0;
    }
    loop {
        if index < 0 {
            index = -index;
        } else if index >= len {
            index = 2 * (len - 1) - index;
        } else {
            return index as usize;
        }
    }
}

/// Horizontal box average over `2 * radius + 1` samples per channel.
fn motion_blur(image: &RgbImage, radius: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut out = RgbImage::new(width, height);
    if width == 0 {
        return out;
    }
    let taps = 2 * radius as i64 + 1;
    let w = width as i64;
    let r = radius as i64;

    for y in 0..height {
        let sample = |x: i64, c: usize| image.get_pixel(reflect_101(x, w) as u32, y).0[c] as i64;
        let mut sums = [0i64; 3];
        for (c, sum) in sums.iter_mut().enumerate() {
            *sum = (-r..=r).map(|dx| sample(dx, c)).sum();
        }
        for x in 0..w {
            let pixel = out.get_pixel_mut(x as u32, y);
            for c in 0..3 {
                pixel.0[c] = ((sums[c] + taps / 2) / taps) as u8;
                sums[c] += sample(x + r + 1, c) - sample(x - r, c);
            }
        }
    }
    out
}

/// Standard normal sample via the Box-Muller transform.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn add_noise(image: &mut RgbImage, factor: f32, rng: &mut StdRng) {
    let sigma = factor as f64 * 255.0;
    for value in image.iter_mut() {
        // Float to int casts saturate, so huge factors stay in range.
        let noise = (standard_normal(rng) * sigma) as i32;
        *value = (*value as i32).saturating_add(noise).clamp(0, 255) as u8;
    }
}

/// Gaussian falloff profile along one axis, peak normalised to 1.
fn falloff(len: u32) -> Vec<f32> {
    let sigma = len as f64 / 2.0;
    let center = (len as f64 - 1.0) / 2.0;
    let raw: Vec<f64> = (0..len)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let peak = raw.iter().cloned().fold(f64::MIN, f64::max);
    raw.into_iter().map(|v| (v / peak) as f32).collect()
}

fn vignette(image: &mut RgbImage, strength: f32) {
    let (width, height) = image.dimensions();
    let fx = falloff(width);
    let fy = falloff(height);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let mask = fx[x as usize] * fy[y as usize] * strength + (1.0 - strength);
        for channel in pixel.0.iter_mut() {
            *channel = (*channel as f32 * mask) as u8;
        }
    }
}

fn warm(image: &mut RgbImage, amount: i32) {
    for pixel in image.pixels_mut() {
        pixel.0[0] = (pixel.0[0] as i32).saturating_add(amount).clamp(0, 255) as u8;
        pixel.0[2] = (pixel.0[2] as i32).saturating_sub(amount).clamp(0, 255) as u8;
    }
}

pub struct CandidEffectStep {
    stage: CandidEffectStage,
}

impl CandidEffectStep {
    pub fn new(stage: CandidEffectStage) -> Self {
        Self { stage }
    }
}

#[async_trait]
impl ProcessingStep for CandidEffectStep {
    async fn process(&mut self, context: &mut JobContext) -> Result<(), PipelineError> {
        let step_start = Instant::now();
        let image = context.take_working()?;
        let stage = self.stage.clone();
        let styled = run_compute("candid effect", move || stage.apply(image)).await?;
        context.working = Some(styled);

        let duration = step_start.elapsed().as_micros() as u64;
        context
            .metrics
            .record_duration(StageType::CandidEffect, duration);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "CandidEffectStep"
    }
}
