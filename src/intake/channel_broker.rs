use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::broker::{Delivery, JobBroker};
use crate::common::Job;
use crate::error::BrokerError;

/// In-process broker on a bounded tokio channel. Nothing survives a
/// restart; used for embedding the worker and in tests.
pub struct ChannelBroker {
    receiver: Mutex<mpsc::Receiver<Job>>,
    acked: AtomicUsize,
}

impl ChannelBroker {
    pub fn channel(buffer: usize) -> (mpsc::Sender<Job>, ChannelBroker) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let broker = ChannelBroker {
            receiver: Mutex::new(receiver),
            acked: AtomicUsize::new(0),
        };
        (sender, broker)
    }

    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobBroker for ChannelBroker {
    async fn next_delivery(&self) -> Result<Option<Delivery>, BrokerError> {
        let job = self.receiver.lock().await.recv().await;
        Ok(job.map(|job| Delivery::new(job, Uuid::new_v4().to_string())))
    }

    async fn ack(&self, _delivery: &Delivery) -> Result<(), BrokerError> {
        self.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ChannelBroker"
    }
}
