use super::job_context::JobContext;
use super::processing_step::ProcessingStep;
use crate::error::PipelineError;

/// Runs steps strictly in insertion order; the first failing step aborts
/// the run and its error is returned unchanged.
pub struct ProcessingPipeline {
    steps: Vec<Box<dyn ProcessingStep>>,
}

impl ProcessingPipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn add_step(mut self, step: Box<dyn ProcessingStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    pub async fn process(&mut self, mut context: JobContext) -> Result<JobContext, PipelineError> {
        for step in &mut self.steps {
            tracing::debug!("Processing step: {}", step.name());
            step.process(&mut context).await?;
        }
        context.metrics.finalize(context.processing_start);
        Ok(context)
    }
}

impl Default for ProcessingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{EffectType, Job};
    use async_trait::async_trait;
    use image::RgbImage;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl ProcessingStep for Recorder {
        async fn process(&mut self, _context: &mut JobContext) -> Result<(), PipelineError> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(PipelineError::State(format!("{} failed", self.name)));
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    fn context() -> JobContext {
        let job = Job {
            photo_id: 1,
            celebrity_id: 1,
            user_id: 1,
            effect_type: EffectType::StreetCandid,
            source_image_path: "s.png".into(),
            template_image_path: "t.png".into(),
        };
        JobContext::new(Arc::new(job), Uuid::new_v4(), RgbImage::new(1, 1), RgbImage::new(1, 1))
    }

    #[tokio::test]
    async fn first_failure_stops_remaining_steps() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let step = |name, fail| {
            Box::new(Recorder {
                name,
                log: log.clone(),
                fail,
            }) as Box<dyn ProcessingStep>
        };
        let mut pipeline = ProcessingPipeline::new()
            .add_step(step("first", false))
            .add_step(step("second", true))
            .add_step(step("third", false));

        assert_eq!(pipeline.step_names(), vec!["first", "second", "third"]);
        let err = pipeline.process(context()).await.err().unwrap();
        assert!(err.to_string().contains("second failed"));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }
}
