use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use candid_composer::config::Configuration;
use candid_composer::error::AppError;
use candid_composer::intake::SpoolBroker;
use candid_composer::pipeline::services::{CpuBackendFactory, ServiceRegistry};
use candid_composer::pipeline::PipelineOrchestrator;
use candid_composer::reconcile;
use candid_composer::sink::JsonResultSink;
use candid_composer::worker::WorkerBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

fn init_logging(level: Level) {
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let configuration = Configuration::load(config_path.as_deref())?;
    init_logging(configuration.log_level());

    let sink = Arc::new(JsonResultSink::new(&configuration.worker.outcome_dir));
    let visibility_timeout = Duration::from_secs(configuration.worker.visibility_timeout_secs);
    let report = {
        let layout = configuration.layout.clone();
        let spool_dir = configuration.worker.spool_dir.clone();
        let sink = sink.as_ref().clone();
        let max_age = Duration::from_secs(configuration.worker.stale_temp_after_secs);
        tokio::task::spawn_blocking(move || {
            reconcile::reconcile(&layout, &spool_dir, &sink, max_age, visibility_timeout)
        })
        .await
        .map_err(|e| AppError::Worker(e.to_string()))??
    };
    info!(
        "Startup sweep: {} temporaries removed, {} results without outcome, {} stale deliveries",
        report.removed_temporaries.len(),
        report.orphaned_results.len(),
        report.stale_deliveries.len()
    );

    let pipeline = &configuration.pipeline;
    let factory = CpuBackendFactory::new(pipeline.enhancement_factor, pipeline.enhancement_filter);
    let registry = Arc::new(ServiceRegistry::with_access(
        Arc::new(factory),
        configuration.worker.inference_access,
    ));
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        registry,
        configuration.layout.clone(),
        configuration.pipeline.clone(),
    ));
    let broker = Arc::new(
        SpoolBroker::open(
            &configuration.worker.spool_dir,
            Duration::from_millis(configuration.worker.poll_interval_ms),
        )
        .await?
        .with_visibility_timeout(visibility_timeout),
    );

    let cancel_token = CancellationToken::new();
    let shutdown = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let worker = WorkerBuilder::new(configuration.worker.clone())
        .broker(broker)
        .sink(sink)
        .orchestrator(orchestrator)
        .cancel_token(cancel_token)
        .build()?;
    let summary = worker.run().await;
    info!(
        "Processed {} jobs ({} failed)",
        summary.completed + summary.failed,
        summary.failed
    );
    Ok(())
}
