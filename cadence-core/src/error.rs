use thiserror::Error;

use crate::store::RecordKind;
use cadence_model::JobTypeId;

/// Failures raised by the job-store coordinator.
#[derive(Error, Debug)]
pub enum JobStoreError {
    #[error("{kind} '{key}' already exists")]
    ObjectAlreadyExists { kind: RecordKind, key: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),

    #[error("Gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl JobStoreError {
    /// True when the failed transaction may succeed if run again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobStoreError::Store(err) if err.is_retryable())
    }
}

impl From<CodecError> for JobStoreError {
    fn from(err: CodecError) -> Self {
        JobStoreError::Store(StoreError::Codec(err))
    }
}

/// Failures raised by a document store engine.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Concurrent modification detected on {0}")]
    Conflict(String),

    #[error("Record vanished: {0}")]
    RecordVanished(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::RecordVanished(_))
    }
}

/// Failures translating between stored records and domain values.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No decoder registered for calendar type '{0}'")]
    UnknownCalendarType(String),

    #[error("Job type '{0}' cannot be resolved")]
    UnknownJobType(JobTypeId),

    #[error("Unexpected payload '{tag}' for {kind} record")]
    UnexpectedPayload { kind: RecordKind, tag: String },
}

pub type Result<T> = std::result::Result<T, JobStoreError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
