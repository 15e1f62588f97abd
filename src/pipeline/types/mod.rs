mod face;
mod outcome;

pub use face::{BoundingBox, FaceDescriptor, Landmark};
pub use outcome::{
    ErrorKind, JobState, OutcomeMessage, OutcomeStatus, PhotoStatus, PipelineOutcome,
};
