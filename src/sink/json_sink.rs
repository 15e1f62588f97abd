use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use super::result_sink::ResultSink;
use crate::error::SinkError;
use crate::pipeline::types::{ErrorKind, OutcomeMessage, OutcomeStatus, PhotoStatus};

/// Stored form of a photo's terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub photo_id: i64,
    pub status: PhotoStatus,
    pub result_path: Option<PathBuf>,
    pub processing_time: Option<f64>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl PhotoRecord {
    pub fn from_outcome(outcome: &OutcomeMessage, completed_at: DateTime<Utc>) -> Self {
        let status = match outcome.status {
            OutcomeStatus::Success => PhotoStatus::Completed,
            OutcomeStatus::Failed => PhotoStatus::Failed,
        };
        Self {
            photo_id: outcome.photo_id,
            status,
            result_path: outcome.result_path.clone(),
            processing_time: outcome.processing_time_seconds,
            error_kind: outcome.error_kind,
            error_message: outcome.error_message.clone(),
            completed_at,
        }
    }
}

/// Writes one `<photo_id>.json` record per photo into a directory.
#[derive(Debug, Clone)]
pub struct JsonResultSink {
    dir: PathBuf,
}

impl JsonResultSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self, photo_id: i64) -> PathBuf {
        self.dir.join(format!("{photo_id}.json"))
    }

    pub fn has_record(&self, photo_id: i64) -> bool {
        self.record_path(photo_id).is_file()
    }

    pub async fn read(&self, photo_id: i64) -> Result<Option<PhotoRecord>, SinkError> {
        let body = match fs::read(self.record_path(photo_id)).await {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SinkError::Write { photo_id, source }),
        };
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|source| SinkError::Serialize { photo_id, source })
    }
}

#[async_trait]
impl ResultSink for JsonResultSink {
    async fn record(&self, outcome: &OutcomeMessage) -> Result<(), SinkError> {
        let photo_id = outcome.photo_id;
        let record = PhotoRecord::from_outcome(outcome, Utc::now());
        let body = serde_json::to_vec_pretty(&record)
            .map_err(|source| SinkError::Serialize { photo_id, source })?;
        let write_error = |source| SinkError::Write { photo_id, source };

        fs::create_dir_all(&self.dir).await.map_err(write_error)?;
        let destination = self.record_path(photo_id);
        let staging = self.dir.join(format!("{photo_id}.json.{}.tmp", Uuid::new_v4()));
        fs::write(&staging, body).await.map_err(write_error)?;
        if let Err(source) = fs::rename(&staging, &destination).await {
            let _ = fs::remove_file(&staging).await;
            return Err(write_error(source));
        }
        debug!("Recorded {:?} for photo {}", record.status, photo_id);
        Ok(())
    }
}
