use crate::error::{PipelineError, ResourceError};
use crate::pipeline::services::{ResourceKind, ServiceRegistry};

/// Runs a blocking backend call on the blocking thread pool while holding
/// the registry's inference permit. A panic inside the backend surfaces as a
/// resource failure of `kind` instead of unwinding into the caller.
pub async fn run_inference<T, F>(
    registry: &ServiceRegistry,
    kind: ResourceKind,
    work: F,
) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    let permit = registry.inference_permit(kind).await?;
    let joined = tokio::task::spawn_blocking(move || {
        let result = work();
        drop(permit);
        result
    })
    .await;
    joined.map_err(|e| {
        PipelineError::Resource(ResourceError::Inference {
            kind,
            reason: format!("backend task aborted: {e}"),
        })
    })?
}

/// Runs local compute that does not touch a shared backend.
pub async fn run_compute<T, F>(label: &'static str, work: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PipelineError::State(format!("{label} task aborted: {e}")))
}
