//! Job queue for the media pipeline.
//!
//! This crate provides:
//! - The [`JobQueue`] client abstraction used at the ingestion boundary
//! - The [`JobConsumer`] side used by workers (consume, ack, retry, DLQ)
//! - A Redis Streams implementation with per-job status records
//! - An in-memory implementation for tests and single-process setups

pub mod error;
pub mod job;
pub mod memory;
pub mod queue;
pub mod redis_queue;

pub use error::{QueueError, QueueResult};
pub use job::{QueueJob, RelabelJob, TranscodeJob};
pub use memory::InMemoryJobQueue;
pub use queue::{Delivery, JobConsumer, JobQueue, QueueConfig};
pub use redis_queue::RedisJobQueue;
