#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use candid_composer::common::{EffectType, FileLayout, Job};
use candid_composer::error::ResourceError;
use candid_composer::pipeline::services::{
    BackendFactory, BackgroundRemover, FaceAnalyzer, FaceSwapper, ResourceKind, Upscaler,
};
use candid_composer::pipeline::types::{BoundingBox, FaceDescriptor};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use tempfile::TempDir;

pub const FACE_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);
pub const BACKGROUND: Rgb<u8> = Rgb([128, 128, 128]);
pub const FACE_ORIGIN: (u32, u32) = (300, 200);
pub const FACE_SIZE: u32 = 40;

/// Tracks how many backend calls are running at the same moment.
#[derive(Default)]
pub struct ConcurrencyGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl ConcurrencyGauge {
    fn enter(&self, delay: Duration) -> GaugeGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        GaugeGuard(self)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct GaugeGuard<'a>(&'a ConcurrencyGauge);

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Reports one face covering the pure-red pixels of an image, or none.
pub struct RedSquareAnalyzer {
    gauge: Arc<ConcurrencyGauge>,
    delay: Duration,
}

impl FaceAnalyzer for RedSquareAnalyzer {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceDescriptor>, ResourceError> {
        let _guard = self.gauge.enter(self.delay);
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, pixel) in image.enumerate_pixels() {
            if *pixel == FACE_COLOUR {
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }
        Ok(bounds
            .map(|(x0, y0, x1, y1)| {
                FaceDescriptor::from_bounds(
                    BoundingBox::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1),
                    vec![1.0, 0.0, 0.0],
                    1.0,
                )
            })
            .into_iter()
            .collect())
    }
}

/// Keeps the target untouched.
pub struct PassThroughSwapper {
    gauge: Arc<ConcurrencyGauge>,
}

impl FaceSwapper for PassThroughSwapper {
    fn swap(
        &self,
        target: &RgbImage,
        _target_face: &FaceDescriptor,
        _source: &RgbImage,
        _source_face: &FaceDescriptor,
    ) -> Result<RgbImage, ResourceError> {
        let _guard = self.gauge.enter(Duration::ZERO);
        Ok(target.clone())
    }
}

pub struct NearestUpscaler {
    factor: u32,
    gauge: Arc<ConcurrencyGauge>,
}

impl Upscaler for NearestUpscaler {
    fn factor(&self) -> u32 {
        self.factor
    }

    fn enhance(&self, image: &RgbImage) -> Result<RgbImage, ResourceError> {
        let _guard = self.gauge.enter(Duration::ZERO);
        Ok(imageops::resize(
            image,
            image.width() * self.factor,
            image.height() * self.factor,
            FilterType::Nearest,
        ))
    }
}

pub struct MockBackends {
    pub gauge: Arc<ConcurrencyGauge>,
    pub detect_delay: Duration,
    pub factor: u32,
}

impl MockBackends {
    pub fn new(factor: u32) -> Self {
        Self {
            gauge: Arc::new(ConcurrencyGauge::default()),
            detect_delay: Duration::ZERO,
            factor,
        }
    }

    pub fn with_detect_delay(mut self, delay: Duration) -> Self {
        self.detect_delay = delay;
        self
    }
}

impl BackendFactory for MockBackends {
    fn face_analyzer(&self) -> Result<Arc<dyn FaceAnalyzer>, ResourceError> {
        Ok(Arc::new(RedSquareAnalyzer {
            gauge: self.gauge.clone(),
            delay: self.detect_delay,
        }))
    }

    fn face_swapper(&self) -> Result<Arc<dyn FaceSwapper>, ResourceError> {
        Ok(Arc::new(PassThroughSwapper {
            gauge: self.gauge.clone(),
        }))
    }

    fn upscaler(&self) -> Result<Arc<dyn Upscaler>, ResourceError> {
        Ok(Arc::new(NearestUpscaler {
            factor: self.factor,
            gauge: self.gauge.clone(),
        }))
    }

    fn background_remover(&self) -> Result<Arc<dyn BackgroundRemover>, ResourceError> {
        Err(ResourceError::Unavailable {
            kind: ResourceKind::BackgroundRemover,
            reason: "not used by these tests".to_string(),
        })
    }
}

pub fn portrait(width: u32, height: u32, with_face: bool) -> RgbImage {
    let (fx, fy) = FACE_ORIGIN;
    RgbImage::from_fn(width, height, |x, y| {
        let inside = (fx..fx + FACE_SIZE).contains(&x) && (fy..fy + FACE_SIZE).contains(&y);
        if with_face && inside {
            FACE_COLOUR
        } else {
            BACKGROUND
        }
    })
}

/// Upload and template trees in a temporary directory.
pub struct Fixture {
    pub dir: TempDir,
    pub layout: FileLayout,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = FileLayout::new(dir.path().join("uploads"), dir.path().join("celebrities"));
        Self { dir, layout }
    }

    /// Writes both inputs as PNG and returns the matching job.
    pub fn job(
        &self,
        photo_id: i64,
        source: &RgbImage,
        template: &RgbImage,
        effect_type: EffectType,
    ) -> Job {
        let job = self.layout.job_for(photo_id, 3, 42, effect_type, "png");
        save(&job.source_image_path, source);
        save(&job.template_image_path, template);
        job
    }

    pub fn user_dir_entries(&self) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(self.layout.user_dir(42))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        entries.sort();
        entries
    }
}

fn save(path: &Path, image: &RgbImage) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    image.save(path).unwrap();
}

/// Mean of one channel over a square patch.
pub fn patch_mean(image: &RgbImage, x: u32, y: u32, size: u32, channel: usize) -> f64 {
    let mut total = 0.0;
    for py in y..y + size {
        for px in x..x + size {
            total += image.get_pixel(px, py).0[channel] as f64;
        }
    }
    total / (size * size) as f64
}
