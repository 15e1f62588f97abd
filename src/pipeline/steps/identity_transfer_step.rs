use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use image::RgbImage;
use serde::Deserialize;

use crate::common::ImageRole;
use crate::error::PipelineError;
use crate::pipeline::orchestration::inference::run_inference;
use crate::pipeline::orchestration::job_context::{JobContext, StageType};
use crate::pipeline::orchestration::ProcessingStep;
use crate::pipeline::services::{FaceAnalyzer, FaceSwapper, ResourceKind, ServiceRegistry};
use crate::pipeline::types::FaceDescriptor;

/// Which job image lends its face and which lends pose and background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityDirection {
    /// The user's face is placed into the template scene.
    #[default]
    UserOntoTemplate,
    /// The template's face is placed onto the user's photo.
    TemplateOntoUser,
}

impl IdentityDirection {
    /// `(identity role, scene role)`
    pub fn roles(self) -> (ImageRole, ImageRole) {
        match self {
            IdentityDirection::UserOntoTemplate => (ImageRole::Source, ImageRole::Template),
            IdentityDirection::TemplateOntoUser => (ImageRole::Template, ImageRole::Source),
        }
    }
}

/// An image together with the job role it plays, so failures can name it.
pub struct RoleImage<'a> {
    pub role: ImageRole,
    pub image: &'a RgbImage,
}

/// Replaces the face in `target` with the identity found in `source`.
///
/// The detector runs once per image. Face indices select among the
/// detector's output as returned; backends that do not order detections
/// deterministically make index selection non-reproducible.
pub struct IdentityTransferStage {
    analyzer: Arc<dyn FaceAnalyzer>,
    swapper: Arc<dyn FaceSwapper>,
    source_face_index: usize,
    target_face_index: usize,
}

impl IdentityTransferStage {
    pub fn new(analyzer: Arc<dyn FaceAnalyzer>, swapper: Arc<dyn FaceSwapper>) -> Self {
        Self {
            analyzer,
            swapper,
            source_face_index: 0,
            target_face_index: 0,
        }
    }

    pub fn with_face_indices(mut self, source_face_index: usize, target_face_index: usize) -> Self {
        self.source_face_index = source_face_index;
        self.target_face_index = target_face_index;
        self
    }

    pub fn transfer(
        &self,
        source: RoleImage<'_>,
        target: RoleImage<'_>,
    ) -> Result<RgbImage, PipelineError> {
        let source_faces = self.analyzer.detect(source.image)?;
        let source_face = select_face(source.role, &source_faces, self.source_face_index)?;

        let target_faces = self.analyzer.detect(target.image)?;
        let target_face = select_face(target.role, &target_faces, self.target_face_index)?;

        tracing::debug!(
            "Swapping {} face {:?} onto {} face {:?}",
            source.role,
            source_face.bounds,
            target.role,
            target_face.bounds
        );
        Ok(self
            .swapper
            .swap(target.image, target_face, source.image, source_face)?)
    }
}

fn select_face(
    role: ImageRole,
    faces: &[FaceDescriptor],
    index: usize,
) -> Result<&FaceDescriptor, PipelineError> {
    if faces.is_empty() {
        return Err(PipelineError::NoFaceDetected(role));
    }
    faces.get(index).ok_or(PipelineError::FaceIndexOutOfRange {
        role,
        index,
        count: faces.len(),
    })
}

/// Pipeline step wrapping [`IdentityTransferStage`]; consumes both input
/// images and leaves the composite as the working image.
pub struct IdentityTransferStep {
    registry: Arc<ServiceRegistry>,
    direction: IdentityDirection,
    source_face_index: usize,
    target_face_index: usize,
}

impl IdentityTransferStep {
    pub fn new(registry: Arc<ServiceRegistry>, direction: IdentityDirection) -> Self {
        Self {
            registry,
            direction,
            source_face_index: 0,
            target_face_index: 0,
        }
    }

    pub fn with_face_indices(mut self, source_face_index: usize, target_face_index: usize) -> Self {
        self.source_face_index = source_face_index;
        self.target_face_index = target_face_index;
        self
    }
}

#[async_trait]
impl ProcessingStep for IdentityTransferStep {
    async fn process(&mut self, context: &mut JobContext) -> Result<(), PipelineError> {
        let step_start = Instant::now();

        let analyzer = self.registry.face_analyzer().await?;
        let swapper = self.registry.face_swapper().await?;
        let stage = IdentityTransferStage::new(analyzer, swapper)
            .with_face_indices(self.source_face_index, self.target_face_index);

        let (identity_role, scene_role) = self.direction.roles();
        let identity = context.take_input(identity_role)?;
        let scene = context.take_input(scene_role)?;

        let composite = run_inference(&self.registry, ResourceKind::FaceSwapper, move || {
            stage.transfer(
                RoleImage {
                    role: identity_role,
                    image: &identity,
                },
                RoleImage {
                    role: scene_role,
                    image: &scene,
                },
            )
        })
        .await?;
        context.working = Some(composite);

        let duration = step_start.elapsed().as_micros() as u64;
        context
            .metrics
            .record_duration(StageType::IdentityTransfer, duration);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "IdentityTransferStep"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResourceError;
    use crate::pipeline::services::face_swap::BlendFaceSwapper;
    use crate::pipeline::types::BoundingBox;
    use image::Rgb;

    /// Reports one face per pixel of value 255 in the red channel of row 0.
    struct MarkerAnalyzer;

    impl FaceAnalyzer for MarkerAnalyzer {
        fn detect(&self, image: &RgbImage) -> Result<Vec<FaceDescriptor>, ResourceError> {
            Ok((0..image.width())
                .filter(|x| image.get_pixel(*x, 0).0[0] == 255)
                .map(|x| {
                    FaceDescriptor::from_bounds(
                        BoundingBox::new(x, 1, 4, 4),
                        vec![x as f32],
                        1.0,
                    )
                })
                .collect())
        }
    }

    fn with_markers(width: u32, markers: &[u32]) -> RgbImage {
        RgbImage::from_fn(width, 8, |x, y| {
            if y == 0 && markers.contains(&x) {
                Rgb([255, 0, 0])
            } else {
                Rgb([10, 10, 10])
            }
        })
    }

    fn stage() -> IdentityTransferStage {
        IdentityTransferStage::new(Arc::new(MarkerAnalyzer), Arc::new(BlendFaceSwapper::new()))
    }

    #[test]
    fn composite_has_target_dimensions() {
        let source = with_markers(12, &[2]);
        let target = with_markers(16, &[5]);
        let out = stage()
            .transfer(
                RoleImage {
                    role: ImageRole::Source,
                    image: &source,
                },
                RoleImage {
                    role: ImageRole::Template,
                    image: &target,
                },
            )
            .unwrap();
        assert_eq!(out.dimensions(), (16, 8));
    }

    #[test]
    fn missing_face_names_the_image() {
        let source = with_markers(12, &[]);
        let target = with_markers(16, &[5]);
        let err = stage()
            .transfer(
                RoleImage {
                    role: ImageRole::Source,
                    image: &source,
                },
                RoleImage {
                    role: ImageRole::Template,
                    image: &target,
                },
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoFaceDetected(ImageRole::Source)));

        let err = stage()
            .transfer(
                RoleImage {
                    role: ImageRole::Source,
                    image: &target,
                },
                RoleImage {
                    role: ImageRole::Template,
                    image: &source,
                },
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoFaceDetected(ImageRole::Template)));
    }

    #[test]
    fn face_index_beyond_detections_is_rejected() {
        let source = with_markers(12, &[1, 6]);
        let target = with_markers(16, &[5]);
        let err = stage()
            .with_face_indices(1, 1)
            .transfer(
                RoleImage {
                    role: ImageRole::Source,
                    image: &source,
                },
                RoleImage {
                    role: ImageRole::Template,
                    image: &target,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::FaceIndexOutOfRange {
                role: ImageRole::Template,
                index: 1,
                count: 1
            }
        ));
    }

    #[test]
    fn direction_decides_which_image_lends_identity() {
        assert_eq!(
            IdentityDirection::default().roles(),
            (ImageRole::Source, ImageRole::Template)
        );
        assert_eq!(
            IdentityDirection::TemplateOntoUser.roles(),
            (ImageRole::Template, ImageRole::Source)
        );
    }
}
