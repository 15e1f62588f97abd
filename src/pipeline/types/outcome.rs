use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Tagged failure kind carried on a failed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputError,
    DetectionError,
    ResourceError,
    IoError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InputError => "InputError",
            ErrorKind::DetectionError => "DetectionError",
            ErrorKind::ResourceError => "ResourceError",
            ErrorKind::IoError => "IOError",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// Result of running one job, produced by the orchestrator for every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<PathBuf>,
    pub processing_time_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PipelineOutcome {
    pub fn success(result_path: PathBuf, processing_time_seconds: f64) -> Self {
        Self {
            status: OutcomeStatus::Success,
            result_path: Some(result_path),
            processing_time_seconds,
            error_kind: None,
            error_message: None,
        }
    }

    pub fn failed(error: &PipelineError, processing_time_seconds: f64) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            result_path: None,
            processing_time_seconds,
            error_kind: Some(error.kind()),
            error_message: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    pub fn photo_status(&self) -> PhotoStatus {
        match self.status {
            OutcomeStatus::Success => PhotoStatus::Completed,
            OutcomeStatus::Failed => PhotoStatus::Failed,
        }
    }

    pub fn into_message(self, photo_id: i64) -> OutcomeMessage {
        OutcomeMessage {
            status: self.status,
            photo_id,
            result_path: self.result_path,
            processing_time_seconds: Some(self.processing_time_seconds),
            error_kind: self.error_kind,
            error_message: self.error_message,
        }
    }
}

/// Message handed to the result sink once a job reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeMessage {
    pub status: OutcomeStatus,
    pub photo_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Status persisted on the photo record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoStatus {
    Processing,
    Completed,
    Failed,
}

/// Per-run lifecycle: `Submitted -> Running -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn advance(self, next: JobState) -> Result<JobState, PipelineError> {
        match (self, next) {
            (JobState::Submitted, JobState::Running)
            | (JobState::Running, JobState::Completed)
            | (JobState::Running, JobState::Failed) => Ok(next),
            (from, to) => Err(PipelineError::State(format!(
                "invalid job transition {from:?} -> {to:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ImageRole;

    #[test]
    fn terminal_states_are_final() {
        let running = JobState::Submitted.advance(JobState::Running).unwrap();
        let done = running.advance(JobState::Completed).unwrap();
        assert!(done.is_terminal());
        assert!(done.advance(JobState::Running).is_err());
        assert!(done.advance(JobState::Failed).is_err());
        assert!(JobState::Failed.advance(JobState::Completed).is_err());
    }

    #[test]
    fn jobs_cannot_skip_running() {
        assert!(JobState::Submitted.advance(JobState::Completed).is_err());
    }

    #[test]
    fn failed_outcome_carries_kind_and_reason() {
        let error = PipelineError::NoFaceDetected(ImageRole::Template);
        let outcome = PipelineOutcome::failed(&error, 1.25);
        assert_eq!(outcome.photo_status(), PhotoStatus::Failed);
        assert_eq!(outcome.error_kind, Some(ErrorKind::DetectionError));
        assert!(outcome.result_path.is_none());

        let json = serde_json::to_value(outcome.into_message(9)).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["photoId"], 9);
        assert_eq!(json["errorKind"], "detection_error");
        assert!(json.get("resultPath").is_none());
    }
}
