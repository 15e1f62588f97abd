use std::convert::Infallible;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use image::RgbImage;
use tower::Service;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::artifact::ArtifactWriter;
use super::inference::run_compute;
use super::job_context::JobContext;
use crate::common::{FileLayout, ImageRole, Job};
use crate::error::PipelineError;
use crate::pipeline::factory::{CompositionPipelineFactory, PipelineConfiguration};
use crate::pipeline::services::ServiceRegistry;
use crate::pipeline::types::{JobState, OutcomeMessage, PipelineOutcome};

/// Runs one job end to end and always answers with an outcome value.
///
/// Stages execute strictly in order and the first failure aborts the rest.
/// The result is published to the canonical path only after every stage
/// succeeded; a failed run never touches that path. No retries happen here,
/// a redelivered job simply runs again and replaces the earlier artifact.
pub struct PipelineOrchestrator {
    registry: Arc<ServiceRegistry>,
    layout: FileLayout,
    config: PipelineConfiguration,
    writer: ArtifactWriter,
}

impl PipelineOrchestrator {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        layout: FileLayout,
        config: PipelineConfiguration,
    ) -> Self {
        let writer = ArtifactWriter::new(config.jpeg_quality);
        Self {
            registry,
            layout,
            config,
            writer,
        }
    }

    pub async fn run(&self, job: Job) -> PipelineOutcome {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let photo_id = job.photo_id;
        let mut state = JobState::Submitted;
        info!(
            "Job submitted: photo {} (user {}, celebrity {}, run {})",
            photo_id, job.user_id, job.celebrity_id, run_id
        );

        let result = match state.advance(JobState::Running) {
            Ok(running) => {
                state = running;
                self.execute(Arc::new(job), run_id).await
            }
            Err(e) => Err(e),
        };
        let terminal = if result.is_ok() {
            JobState::Completed
        } else {
            JobState::Failed
        };
        match state.advance(terminal) {
            Ok(state) => debug!("Photo {} is {:?}", photo_id, state),
            Err(e) => warn!("Photo {}: {}", photo_id, e),
        }
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(result_path) => {
                info!(
                    "Job completed: photo {} -> {} in {:.2}s",
                    photo_id,
                    result_path.display(),
                    elapsed
                );
                PipelineOutcome::success(result_path, elapsed)
            }
            Err(e) => {
                error!(
                    "Job failed: photo {} ({}) after {:.2}s: {}",
                    photo_id,
                    e.kind(),
                    elapsed,
                    e
                );
                PipelineOutcome::failed(&e, elapsed)
            }
        }
    }

    async fn execute(&self, job: Arc<Job>, run_id: Uuid) -> Result<PathBuf, PipelineError> {
        let (source, template) = tokio::try_join!(
            load_image(ImageRole::Source, job.image_path(ImageRole::Source).clone()),
            load_image(ImageRole::Template, job.image_path(ImageRole::Template).clone()),
        )?;

        let context = JobContext::new(job.clone(), run_id, source, template);
        let mut pipeline = CompositionPipelineFactory::create_pipeline(
            &self.config,
            self.registry.clone(),
            job.effect_type,
        );
        let mut context = pipeline.process(context).await?;
        debug!("Stage timings for photo {}: {:?}", job.photo_id, context.metrics);

        let image = context.take_working()?;
        let destination = self.layout.result_path(job.user_id, job.photo_id);
        if destination.exists() {
            warn!(
                "Replacing existing result for photo {} at {}",
                job.photo_id,
                destination.display()
            );
        }
        let writer = self.writer.clone();
        let target = destination.clone();
        run_compute("result publish", move || writer.publish(&image, &target)).await??;
        Ok(destination)
    }
}

async fn load_image(role: ImageRole, path: PathBuf) -> Result<RgbImage, PipelineError> {
    run_compute("image decode", move || {
        image::open(&path)
            .map(|decoded| decoded.to_rgb8())
            .map_err(|e| PipelineError::Input {
                role,
                path,
                reason: e.to_string(),
            })
    })
    .await?
}

/// `tower` face of the orchestrator, so workers can compose it with
/// concurrency limits and other middleware.
#[derive(Clone)]
pub struct OrchestratorService {
    inner: Arc<PipelineOrchestrator>,
}

impl OrchestratorService {
    pub fn new(inner: Arc<PipelineOrchestrator>) -> Self {
        Self { inner }
    }
}

impl Service<Job> for OrchestratorService {
    type Response = OutcomeMessage;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, job: Job) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move {
            let photo_id = job.photo_id;
            let outcome = inner.run(job).await;
            Ok(outcome.into_message(photo_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EffectType;
    use crate::pipeline::services::{CpuBackendFactory, ResourceKind};
    use crate::pipeline::types::{ErrorKind, OutcomeStatus};
    use tower::ServiceExt;

    #[tokio::test]
    async fn service_answers_with_a_message_for_the_photo() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ServiceRegistry::new(Arc::new(CpuBackendFactory::default())));
        let layout = FileLayout::new(dir.path().join("uploads"), dir.path().join("celebrities"));
        let orchestrator = PipelineOrchestrator::new(
            registry.clone(),
            layout.clone(),
            PipelineConfiguration::default(),
        );
        let job = layout.job_for(5, 2, 9, EffectType::StreetCandid, "png");

        let message = OrchestratorService::new(Arc::new(orchestrator))
            .oneshot(job)
            .await
            .unwrap();

        assert_eq!(message.photo_id, 5);
        assert_eq!(message.status, OutcomeStatus::Failed);
        assert_eq!(message.error_kind, Some(ErrorKind::InputError));
        assert!(message.processing_time_seconds.is_some());
        assert!(!layout.result_path(9, 5).exists());
        // Inputs are read before any backend is needed.
        assert_eq!(registry.constructions(ResourceKind::FaceAnalyzer), 0);
    }
}
