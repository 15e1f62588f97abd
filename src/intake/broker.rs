use async_trait::async_trait;

use crate::common::Job;
use crate::error::BrokerError;

/// A job handed out by a broker together with the tag needed to
/// acknowledge it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job: Job,
    tag: String,
}

impl Delivery {
    pub fn new(job: Job, tag: impl Into<String>) -> Self {
        Self {
            job,
            tag: tag.into(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// Source of queued jobs with at-least-once delivery. A delivery that is
/// never acknowledged is handed out again later, so running a job twice
/// must be harmless.
#[async_trait]
pub trait JobBroker: Send + Sync {
    /// Waits for the next job. `Ok(None)` means the broker is closed and
    /// drained.
    async fn next_delivery(&self) -> Result<Option<Delivery>, BrokerError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    fn name(&self) -> &'static str;
}
