use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tower::util::BoxService;
use tower::{Service, ServiceBuilder, ServiceExt};
use tracing::{debug, error, info, warn};

use crate::common::Job;
use crate::config::WorkerConfiguration;
use crate::error::{AppError, BrokerError};
use crate::intake::{Delivery, JobBroker};
use crate::pipeline::orchestration::{OrchestratorService, PipelineOrchestrator};
use crate::pipeline::types::{OutcomeMessage, OutcomeStatus};
use crate::sink::ResultSink;

const BROKER_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Totals for one worker run, returned when the worker stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub completed: usize,
    pub failed: usize,
    /// Jobs whose outcome could not be recorded or acknowledged. The broker
    /// hands these out again.
    pub unacknowledged: usize,
}

impl WorkerReport {
    fn absorb(&mut self, joined: Result<Settlement, JoinError>) {
        match joined {
            Ok(Settlement::Acked(OutcomeStatus::Success)) => self.completed += 1,
            Ok(Settlement::Acked(OutcomeStatus::Failed)) => self.failed += 1,
            Ok(Settlement::Unacked) => self.unacknowledged += 1,
            Err(e) => {
                error!("Job task ended abnormally: {}", e);
                self.unacknowledged += 1;
            }
        }
    }
}

enum Settlement {
    Acked(OutcomeStatus),
    Unacked,
}

/// Pulls jobs from a broker and runs them through the orchestrator, at most
/// `concurrency` at a time. Every outcome goes to the sink before its
/// delivery is acknowledged.
pub struct Worker {
    broker: Arc<dyn JobBroker>,
    sink: Arc<dyn ResultSink>,
    service: BoxService<Job, OutcomeMessage, Infallible>,
    cancel_token: CancellationToken,
}

impl Worker {
    fn new(
        broker: Arc<dyn JobBroker>,
        sink: Arc<dyn ResultSink>,
        orchestrator: Arc<PipelineOrchestrator>,
        concurrency: usize,
        cancel_token: CancellationToken,
    ) -> Self {
        let service = ServiceBuilder::new()
            .concurrency_limit(concurrency)
            .service(OrchestratorService::new(orchestrator))
            .boxed();
        Self {
            broker,
            sink,
            service,
            cancel_token,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Runs until the token is cancelled or the broker closes, then waits
    /// for the jobs already started.
    pub async fn run(mut self) -> WorkerReport {
        info!("Worker started on {}", self.broker.name());
        let mut in_flight = JoinSet::new();
        let mut report = WorkerReport::default();

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                report.absorb(joined);
            }

            // Reserve a slot before taking a job off the queue.
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                ready = self.service.ready() => match ready {
                    Ok(_) => {}
                    Err(never) => match never {},
                },
            }

            let delivery = tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                next = self.broker.next_delivery() => match next {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) | Err(BrokerError::Closed) => {
                        info!("Broker {} is closed", self.broker.name());
                        break;
                    }
                    Err(e @ BrokerError::Malformed { .. }) => {
                        warn!("Skipping job message: {}", e);
                        continue;
                    }
                    Err(e) => {
                        error!("Failed to receive job: {}", e);
                        let _ = tokio::time::timeout(
                            BROKER_ERROR_BACKOFF,
                            self.cancel_token.cancelled(),
                        )
                        .await;
                        continue;
                    }
                },
            };

            debug!(
                "Dispatching photo {} ({})",
                delivery.job.photo_id,
                delivery.tag()
            );
            let response = self.service.call(delivery.job.clone());
            in_flight.spawn(settle(
                self.broker.clone(),
                self.sink.clone(),
                delivery,
                response,
            ));
        }

        if !in_flight.is_empty() {
            info!("Worker stopping, waiting for {} jobs", in_flight.len());
        }
        while let Some(joined) = in_flight.join_next().await {
            report.absorb(joined);
        }
        info!(
            "Worker stopped: {} completed, {} failed, {} unacknowledged",
            report.completed, report.failed, report.unacknowledged
        );
        report
    }
}

async fn settle<F>(
    broker: Arc<dyn JobBroker>,
    sink: Arc<dyn ResultSink>,
    delivery: Delivery,
    response: F,
) -> Settlement
where
    F: Future<Output = Result<OutcomeMessage, Infallible>>,
{
    let outcome = match response.await {
        Ok(outcome) => outcome,
        Err(never) => match never {},
    };

    if let Err(e) = sink.record(&outcome).await {
        error!(
            "Outcome for photo {} not recorded, leaving it for redelivery: {}",
            outcome.photo_id, e
        );
        return Settlement::Unacked;
    }
    if let Err(e) = broker.ack(&delivery).await {
        warn!("Failed to acknowledge photo {}: {}", outcome.photo_id, e);
        return Settlement::Unacked;
    }
    Settlement::Acked(outcome.status)
}

pub struct WorkerBuilder {
    configuration: WorkerConfiguration,
    broker: Option<Arc<dyn JobBroker>>,
    sink: Option<Arc<dyn ResultSink>>,
    orchestrator: Option<Arc<PipelineOrchestrator>>,
    cancel_token: Option<CancellationToken>,
}

impl WorkerBuilder {
    pub fn new(configuration: WorkerConfiguration) -> Self {
        Self {
            configuration,
            broker: None,
            sink: None,
            orchestrator: None,
            cancel_token: None,
        }
    }

    // Overrides the configured pool size.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.configuration.concurrency = concurrency;
        self
    }

    pub fn broker(mut self, broker: Arc<dyn JobBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn orchestrator(mut self, orchestrator: Arc<PipelineOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    // Shares a token with the caller; a fresh one is created otherwise.
    pub fn cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = Some(cancel_token);
        self
    }

    pub fn build(self) -> Result<Worker, AppError> {
        if self.configuration.concurrency == 0 {
            return Err(AppError::Worker(
                "Concurrency must be greater than 0".to_string(),
            ));
        }
        let broker = self
            .broker
            .ok_or(AppError::Worker("Broker not set".to_string()))?;
        let sink = self
            .sink
            .ok_or(AppError::Worker("Result sink not set".to_string()))?;
        let orchestrator = self
            .orchestrator
            .ok_or(AppError::Worker("Orchestrator not set".to_string()))?;
        Ok(Worker::new(
            broker,
            sink,
            orchestrator,
            self.configuration.concurrency,
            self.cancel_token.unwrap_or_default(),
        ))
    }
}
