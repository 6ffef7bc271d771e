//! Media ingestion worker.
//!
//! This crate provides:
//! - The ingestion trigger and deletion handler reacting to asset events
//! - Artifact resolution for listing views
//! - The job executor running transcode and relabel jobs
//! - Configuration, logging and metrics shared by the binaries

pub mod artifacts;
pub mod config;
pub mod deletion;
pub mod error;
pub mod events;
pub mod executor;
pub mod ingestion;
mod invalidation;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod store;

pub use artifacts::{ArtifactSet, VariantArtifact};
pub use config::{PipelineConfig, WorkerConfig};
pub use deletion::{ArtifactKind, DeletionHandler, DeletionReport};
pub use error::{WorkerError, WorkerResult};
pub use events::{EventBus, EventReceiver, DEFAULT_EVENT_CAPACITY};
pub use executor::JobExecutor;
pub use ingestion::{IngestionReport, IngestionTrigger, ThumbnailOutcome};
pub use logging::{init_tracing, JobLogger};
pub use pipeline::Pipeline;
pub use store::{AssetStore, InMemoryAssetStore};
