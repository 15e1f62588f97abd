use std::path::PathBuf;

use thiserror::Error;

use crate::common::ImageRole;
use crate::pipeline::services::ResourceKind;
use crate::pipeline::types::ErrorKind;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration Error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Broker Error: {0}")]
    Broker(#[from] BrokerError),
    #[error("Sink Error: {0}")]
    Sink(#[from] SinkError),
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Worker Error: {0}")]
    Worker(String),
}

// Failures raised while running one job through the pipeline. Every variant
// maps onto exactly one outcome `ErrorKind`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to load {role} image at {}: {reason}", path.display())]
    Input {
        role: ImageRole,
        path: PathBuf,
        reason: String,
    },
    #[error("Face detection found no face in the {0} image")]
    NoFaceDetected(ImageRole),
    #[error("Face index {index} is out of range for the {role} image ({count} faces detected)")]
    FaceIndexOutOfRange {
        role: ImageRole,
        index: usize,
        count: usize,
    },
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("Failed to write result to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode result image: {0}")]
    Encode(String),
    #[error("Pipeline state error: {0}")]
    State(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Input { .. } => ErrorKind::InputError,
            PipelineError::NoFaceDetected(_) | PipelineError::FaceIndexOutOfRange { .. } => {
                ErrorKind::DetectionError
            }
            PipelineError::Resource(_) | PipelineError::State(_) => ErrorKind::ResourceError,
            PipelineError::Io { .. } | PipelineError::Encode(_) => ErrorKind::IoError,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum ResourceError {
    #[error("{kind} backend unavailable: {reason}")]
    Unavailable { kind: ResourceKind, reason: String },
    #[error("{kind} backend failed: {reason}")]
    Inference { kind: ResourceKind, reason: String },
}

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Failed to access spool directory {}: {source}", path.display())]
    Spool {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed job message in {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("The broker channel is closed.")]
    Closed,
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write outcome for photo {photo_id}: {source}")]
    Write {
        photo_id: i64,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize outcome for photo {photo_id}: {source}")]
    Serialize {
        photo_id: i64,
        #[source]
        source: serde_json::Error,
    },
    #[error("Sink rejected outcome: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_errors_name_the_image() {
        let err = PipelineError::NoFaceDetected(ImageRole::Source);
        assert_eq!(err.kind(), ErrorKind::DetectionError);
        let message = err.to_string();
        assert!(message.contains("source image"));
        assert!(message.contains("Face detection"));
    }

    #[test]
    fn resource_errors_keep_their_kind_through_conversion() {
        let err: PipelineError = ResourceError::Unavailable {
            kind: ResourceKind::Upscaler,
            reason: "no device".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::ResourceError);
        assert!(err.to_string().contains("upscaler"));
    }
}
