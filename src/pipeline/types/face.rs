use serde::{Deserialize, Serialize};

/// Axis-aligned face region in pixel coordinates of the analysed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// Shrinks the box so it lies inside a `width` x `height` image.
    /// Returns `None` when nothing of it remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(BoundingBox::new(self.x, self.y, w, h))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

/// One detected face: region, five-point landmarks (left eye, right eye,
/// nose, left mouth corner, right mouth corner), identity embedding and
/// detector confidence in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDescriptor {
    pub bounds: BoundingBox,
    pub landmarks: [Landmark; 5],
    pub embedding: Vec<f32>,
    pub confidence: f32,
}

impl FaceDescriptor {
    /// Descriptor with landmarks placed at the usual proportions of a
    /// frontal face inside `bounds`.
    pub fn from_bounds(bounds: BoundingBox, embedding: Vec<f32>, confidence: f32) -> Self {
        let point = |fx: f32, fy: f32| Landmark {
            x: bounds.x as f32 + bounds.width as f32 * fx,
            y: bounds.y as f32 + bounds.height as f32 * fy,
        };
        Self {
            bounds,
            landmarks: [
                point(0.3, 0.38),
                point(0.7, 0.38),
                point(0.5, 0.58),
                point(0.35, 0.78),
                point(0.65, 0.78),
            ],
            embedding,
            confidence,
        }
    }
}
