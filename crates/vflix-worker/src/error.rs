//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Asset store error: {0}")]
    Store(String),

    #[error("Job timed out after {0}s")]
    Timeout(u64),

    #[error("Reschedule: {0}")]
    Reschedule(String),

    #[error("Event bus closed")]
    EventBusClosed,

    #[error("Media error: {0}")]
    Media(#[from] vflix_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] vflix_queue::QueueError),

    #[error("Cache error: {0}")]
    Cache(#[from] vflix_cache::CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a reschedule error - the job should run again later.
    ///
    /// Used for jobs fenced behind other jobs that have not finished yet.
    pub fn reschedule(msg: impl Into<String>) -> Self {
        Self::Reschedule(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Media(e) => e.is_retryable(),
            WorkerError::Queue(_) | WorkerError::Cache(_) | WorkerError::Store(_) => true,
            WorkerError::Timeout(_) | WorkerError::Io(_) => true,
            WorkerError::JobFailed(_)
            | WorkerError::ConfigError(_)
            | WorkerError::Reschedule(_)
            | WorkerError::EventBusClosed => false,
        }
    }

    /// Check if error is a reschedule request.
    pub fn is_reschedule(&self) -> bool {
        matches!(self, WorkerError::Reschedule(_))
    }
}
