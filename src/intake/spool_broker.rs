use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::broker::{Delivery, JobBroker};
use crate::common::Job;
use crate::error::BrokerError;

const PENDING_DIR: &str = "pending";
pub const INFLIGHT_DIR: &str = "inflight";
const REJECTED_DIR: &str = "rejected";
const MESSAGE_EXTENSION: &str = "json";
const CLAIM_SEPARATOR: char = '~';
const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(600);

/// Durable directory queue.
///
/// ```text
/// <root>/pending/   submitted, not yet claimed
/// <root>/inflight/  claimed by a worker, removed on ack
/// <root>/rejected/  messages that could not be parsed
/// ```
///
/// Claiming is a rename from `pending/` into `inflight/`, so two workers
/// sharing a spool never get the same message. The claimed file name is
/// prefixed with the claim time (`<micros>~<name>`). A claim that is not
/// acknowledged within the visibility timeout is moved back to `pending/`,
/// and everything in `inflight/` is moved back when a broker opens.
pub struct SpoolBroker {
    root: PathBuf,
    poll_interval: Duration,
    visibility_timeout: Duration,
}

impl SpoolBroker {
    pub async fn open(
        root: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Result<Self, BrokerError> {
        let broker = Self {
            root: root.into(),
            poll_interval,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
        };
        for dir in [PENDING_DIR, INFLIGHT_DIR, REJECTED_DIR] {
            let path = broker.root.join(dir);
            fs::create_dir_all(&path)
                .await
                .map_err(|source| BrokerError::Spool { path, source })?;
        }

        let requeued = broker.requeue_inflight(None).await?;
        if requeued > 0 {
            info!(
                "Requeued {} unacknowledged jobs in {}",
                requeued,
                broker.root.display()
            );
        }
        Ok(broker)
    }

    /// How long a claimed job may stay unacknowledged before it is handed
    /// out again.
    pub fn with_visibility_timeout(mut self, visibility_timeout: Duration) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }

    /// Claim time encoded in an inflight file name.
    pub fn claimed_at(path: &Path) -> Option<DateTime<Utc>> {
        let name = path.file_name()?.to_str()?;
        let (micros, _) = name.split_once(CLAIM_SEPARATOR)?;
        DateTime::from_timestamp_micros(micros.parse().ok()?)
    }

    /// Enqueues a job. The message is staged outside `pending/` and renamed
    /// in, so consumers never see a partial file.
    pub async fn submit(&self, job: &Job) -> Result<PathBuf, BrokerError> {
        let name = format!(
            "{:020}-{}.{MESSAGE_EXTENSION}",
            Utc::now().timestamp_micros(),
            Uuid::new_v4()
        );
        let staging = self.root.join(format!("{name}.tmp"));
        let destination = self.root.join(PENDING_DIR).join(&name);
        let body = serde_json::to_vec(job).map_err(|source| BrokerError::Malformed {
            path: destination.clone(),
            source,
        })?;

        fs::write(&staging, body)
            .await
            .map_err(|source| BrokerError::Spool {
                path: staging.clone(),
                source,
            })?;
        if let Err(source) = fs::rename(&staging, &destination).await {
            let _ = fs::remove_file(&staging).await;
            return Err(BrokerError::Spool {
                path: destination,
                source,
            });
        }
        debug!("Submitted photo {} as {}", job.photo_id, name);
        Ok(destination)
    }

    /// Moves claims back to `pending/`: all of them, or only those older
    /// than `older_than`.
    async fn requeue_inflight(&self, older_than: Option<Duration>) -> Result<usize, BrokerError> {
        let inflight = self.root.join(INFLIGHT_DIR);
        let now = Utc::now();
        let mut requeued = 0;
        for path in list_messages(&inflight).await? {
            if let Some(timeout) = older_than {
                let expired = match Self::claimed_at(&path) {
                    Some(claimed) => (now - claimed).to_std().unwrap_or_default() >= timeout,
                    None => true,
                };
                if !expired {
                    continue;
                }
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let original = name
                .split_once(CLAIM_SEPARATOR)
                .map_or(name, |(_, original)| original);
            let target = self.root.join(PENDING_DIR).join(original);
            match fs::rename(&path, &target).await {
                Ok(()) => requeued += 1,
                // Acked or requeued by someone else in the meantime.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(BrokerError::Spool {
                        path: path.clone(),
                        source,
                    })
                }
            }
        }
        Ok(requeued)
    }

    /// Moves a pending message into `inflight/`. `None` when another
    /// consumer claimed it first.
    async fn claim(&self, path: &Path) -> Result<Option<PathBuf>, BrokerError> {
        let Some(name) = path.file_name() else {
            return Ok(None);
        };
        let claimed = format!(
            "{:020}{CLAIM_SEPARATOR}{}",
            Utc::now().timestamp_micros(),
            name.to_string_lossy()
        );
        let target = self.root.join(INFLIGHT_DIR).join(claimed);
        match fs::rename(path, &target).await {
            Ok(()) => Ok(Some(target)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(BrokerError::Spool {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    async fn read_job(&self, path: &Path) -> Result<Job, BrokerError> {
        let body = fs::read(path).await.map_err(|source| BrokerError::Spool {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&body).map_err(|source| BrokerError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    async fn reject(&self, path: &Path) {
        if let Some(name) = path.file_name() {
            let target = self.root.join(REJECTED_DIR).join(name);
            if let Err(e) = fs::rename(path, &target).await {
                warn!("Could not move {} to rejected: {}", path.display(), e);
            }
        }
    }
}

#[async_trait]
impl JobBroker for SpoolBroker {
    async fn next_delivery(&self) -> Result<Option<Delivery>, BrokerError> {
        loop {
            let expired = self.requeue_inflight(Some(self.visibility_timeout)).await?;
            if expired > 0 {
                warn!(
                    "Requeued {} jobs not acknowledged within {:?}",
                    expired, self.visibility_timeout
                );
            }
            for path in list_messages(&self.root.join(PENDING_DIR)).await? {
                let Some(claimed) = self.claim(&path).await? else {
                    continue;
                };
                let tag = claimed
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                return match self.read_job(&claimed).await {
                    Ok(job) => Ok(Some(Delivery::new(job, tag))),
                    Err(e @ BrokerError::Malformed { .. }) => {
                        self.reject(&claimed).await;
                        Err(e)
                    }
                    // Left in inflight/ until the visibility timeout.
                    Err(e) => Err(e),
                };
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let path = self.root.join(INFLIGHT_DIR).join(delivery.tag());
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Delivery {} was already acknowledged", delivery.tag());
                Ok(())
            }
            Err(source) => Err(BrokerError::Spool { path, source }),
        }
    }

    fn name(&self) -> &'static str {
        "SpoolBroker"
    }
}

/// Message files in `dir`, oldest first by name.
async fn list_messages(dir: &Path) -> Result<Vec<PathBuf>, BrokerError> {
    let spool_error = |source| BrokerError::Spool {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(dir).await.map_err(spool_error)?;
    let mut messages = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(spool_error)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == MESSAGE_EXTENSION) {
            messages.push(path);
        }
    }
    messages.sort();
    Ok(messages)
}
