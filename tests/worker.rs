mod common;

use std::sync::Arc;
use std::time::Duration;

use candid_composer::common::EffectType;
use candid_composer::config::WorkerConfiguration;
use candid_composer::intake::{ChannelBroker, SpoolBroker};
use candid_composer::pipeline::services::{InferenceAccess, ResourceKind, ServiceRegistry};
use candid_composer::pipeline::types::PhotoStatus;
use candid_composer::pipeline::{PipelineConfiguration, PipelineOrchestrator};
use candid_composer::sink::JsonResultSink;
use candid_composer::worker::WorkerBuilder;
use common::{portrait, Fixture, MockBackends};
use tokio_util::sync::CancellationToken;

const JOBS: i64 = 4;

fn small_config() -> PipelineConfiguration {
    PipelineConfiguration {
        enhancement_factor: 2,
        ..PipelineConfiguration::deterministic(3)
    }
}

async fn run_batch(access: InferenceAccess) -> (Arc<MockBackends>, Arc<ServiceRegistry>, usize) {
    let fixture = Fixture::new();
    let backends = Arc::new(MockBackends::new(2).with_detect_delay(Duration::from_millis(40)));
    let registry = Arc::new(ServiceRegistry::with_access(backends.clone(), access));
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        registry.clone(),
        fixture.layout.clone(),
        small_config(),
    ));
    let sink = Arc::new(JsonResultSink::new(fixture.dir.path().join("outcomes")));
    let (sender, broker) = ChannelBroker::channel(JOBS as usize);
    for photo_id in 1..=JOBS {
        let job = fixture.job(
            photo_id,
            &portrait(400, 300, true),
            &portrait(400, 300, true),
            EffectType::Plain,
        );
        sender.send(job).await.unwrap();
    }
    drop(sender);

    let report = WorkerBuilder::new(WorkerConfiguration::default())
        .concurrency(JOBS as usize)
        .broker(Arc::new(broker))
        .sink(sink.clone())
        .orchestrator(orchestrator)
        .build()
        .unwrap()
        .run()
        .await;

    for photo_id in 1..=JOBS {
        let record = sink.read(photo_id).await.unwrap().unwrap();
        assert_eq!(record.status, PhotoStatus::Completed);
    }
    (backends, registry, report.completed)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn serialized_access_runs_one_backend_call_at_a_time() {
    let (backends, registry, completed) = run_batch(InferenceAccess::Serialized).await;

    assert_eq!(completed, JOBS as usize);
    assert_eq!(backends.gauge.peak(), 1);
    // Two detections, one swap and one upscale per job.
    assert_eq!(backends.gauge.calls(), 4 * JOBS as usize);
    for kind in ResourceKind::ALL {
        if kind != ResourceKind::BackgroundRemover {
            assert_eq!(registry.constructions(kind), 1, "{kind}");
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_access_lets_jobs_overlap() {
    let (backends, registry, completed) = run_batch(InferenceAccess::Shared).await;

    assert_eq!(completed, JOBS as usize);
    assert!(backends.gauge.peak() > 1);
    assert_eq!(registry.constructions(ResourceKind::FaceAnalyzer), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spooled_job_is_recorded_and_acknowledged() {
    let fixture = Fixture::new();
    let spool_dir = fixture.dir.path().join("spool");
    let broker = Arc::new(
        SpoolBroker::open(&spool_dir, Duration::from_millis(10))
            .await
            .unwrap(),
    );
    let job = fixture.job(
        21,
        &portrait(400, 300, true),
        &portrait(400, 300, true),
        EffectType::StreetCandid,
    );
    broker.submit(&job).await.unwrap();

    let registry = Arc::new(ServiceRegistry::new(Arc::new(MockBackends::new(2))));
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        registry,
        fixture.layout.clone(),
        small_config(),
    ));
    let sink = Arc::new(JsonResultSink::new(fixture.dir.path().join("outcomes")));
    let token = CancellationToken::new();
    let worker = WorkerBuilder::new(WorkerConfiguration::default())
        .broker(broker)
        .sink(sink.clone())
        .orchestrator(orchestrator)
        .cancel_token(token.clone())
        .build()
        .unwrap();
    let handle = tokio::spawn(worker.run());

    let record = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            if let Some(record) = sink.read(21).await.unwrap() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    token.cancel();
    let report = handle.await.unwrap();

    assert_eq!(record.status, PhotoStatus::Completed);
    assert_eq!(record.result_path, Some(fixture.layout.result_path(42, 21)));
    assert_eq!(report.completed, 1);
    let inflight = std::fs::read_dir(spool_dir.join("inflight")).unwrap().count();
    assert_eq!(inflight, 0);
}
