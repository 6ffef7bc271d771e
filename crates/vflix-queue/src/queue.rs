//! Queue abstractions and configuration.

use std::time::Duration;

use async_trait::async_trait;
use vflix_models::{JobId, JobState};

use crate::error::QueueResult;
use crate::job::QueueJob;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Max retries before DLQ
    pub max_retries: u32,
    /// How long job status records are kept
    pub status_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vflix:jobs".to_string(),
            consumer_group: "vflix:workers".to_string(),
            dlq_stream_name: "vflix:dlq".to_string(),
            max_retries: 3,
            status_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            status_ttl: std::env::var("QUEUE_STATUS_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.status_ttl),
        }
    }

    /// Redis key holding the state of one job.
    pub fn status_key(&self, job_id: &JobId) -> String {
        format!("vflix:job:{}", job_id)
    }

    /// Redis key holding the delivery attempt count of one stream message.
    pub fn retry_key(&self, message_id: &str) -> String {
        format!("vflix:retry:{}", message_id)
    }
}

/// Producer side of the queue.
///
/// `enqueue` returns only after the broker has durably accepted the job.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit a job and return its ID.
    async fn enqueue(&self, job: QueueJob) -> QueueResult<JobId>;

    /// Last recorded state of a job, if the queue knows it.
    async fn status(&self, job_id: &JobId) -> QueueResult<Option<JobState>>;
}

/// A job handed to a consumer, with the broker handle needed to settle it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message_id: String,
    pub job: QueueJob,
}

/// Consumer side of the queue used by workers.
#[async_trait]
pub trait JobConsumer: JobQueue {
    /// Prepare broker state (consumer groups, streams).
    async fn init(&self) -> QueueResult<()> {
        Ok(())
    }

    /// Read up to `count` new jobs, waiting at most `block` when none are ready.
    async fn consume(&self, consumer: &str, block: Duration, count: usize) -> QueueResult<Vec<Delivery>>;

    /// Take over jobs another consumer left unacknowledged for at least `min_idle`.
    async fn claim_pending(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Mark a delivery as done and drop it from the queue.
    async fn ack(&self, message_id: &str) -> QueueResult<()>;

    /// Put `job` back on the queue as a fresh message and settle `delivery`.
    async fn requeue(&self, delivery: &Delivery, job: QueueJob) -> QueueResult<()>;

    /// Move a delivery to the dead letter queue.
    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()>;

    /// Record one more failed attempt and return the new count.
    async fn increment_retry(&self, message_id: &str) -> QueueResult<u32>;

    /// Record the state of a job.
    async fn set_status(&self, job_id: &JobId, state: JobState) -> QueueResult<()>;

    /// Attempts allowed before a job is dead-lettered.
    fn max_retries(&self) -> u32;
}
