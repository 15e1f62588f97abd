use async_trait::async_trait;

use crate::error::SinkError;
use crate::pipeline::types::OutcomeMessage;

/// Persists the terminal status of a photo. Recording the same photo again
/// replaces the earlier record.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record(&self, outcome: &OutcomeMessage) -> Result<(), SinkError>;
}
