//! Job types for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vflix_models::{AssetId, JobId, ResolutionTarget};

/// Produce one resolution variant of a source file.
///
/// The job carries the full encoder target so workers do not depend on
/// their own copy of the rendition configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Asset the source belongs to
    pub asset_id: AssetId,
    /// Source file path
    pub source_path: PathBuf,
    /// Variant to produce
    pub target: ResolutionTarget,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl TranscodeJob {
    pub fn new(asset_id: AssetId, source_path: impl Into<PathBuf>, target: ResolutionTarget) -> Self {
        Self {
            job_id: JobId::new(),
            asset_id,
            source_path: source_path.into(),
            target,
            created_at: Utc::now(),
        }
    }

    pub fn variant_label(&self) -> &str {
        &self.target.label
    }
}

/// Move the source file to a variant path once sibling jobs are finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelabelJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Asset the source belongs to
    pub asset_id: AssetId,
    /// Source file path
    pub source_path: PathBuf,
    /// Label the source is renamed to
    pub label: String,
    /// Jobs that still read the source and must finish first
    #[serde(default)]
    pub await_jobs: Vec<JobId>,
    /// How many times the job was put back because siblings were running
    #[serde(default)]
    pub reschedules: u32,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl RelabelJob {
    pub fn new(
        asset_id: AssetId,
        source_path: impl Into<PathBuf>,
        label: impl Into<String>,
        await_jobs: Vec<JobId>,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            asset_id,
            source_path: source_path.into(),
            label: label.into(),
            await_jobs,
            reschedules: 0,
            created_at: Utc::now(),
        }
    }

    /// Same job, one more reschedule recorded.
    pub fn rescheduled(&self) -> Self {
        Self {
            reschedules: self.reschedules + 1,
            ..self.clone()
        }
    }
}

/// Any job that can be put on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    Transcode(TranscodeJob),
    Relabel(RelabelJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::Transcode(j) => &j.job_id,
            QueueJob::Relabel(j) => &j.job_id,
        }
    }

    pub fn asset_id(&self) -> &AssetId {
        match self {
            QueueJob::Transcode(j) => &j.asset_id,
            QueueJob::Relabel(j) => &j.asset_id,
        }
    }

    pub fn source_path(&self) -> &Path {
        match self {
            QueueJob::Transcode(j) => &j.source_path,
            QueueJob::Relabel(j) => &j.source_path,
        }
    }

    /// Operation name used in logs and metrics.
    pub fn operation(&self) -> &'static str {
        match self {
            QueueJob::Transcode(_) => "transcode",
            QueueJob::Relabel(_) => "relabel",
        }
    }

    /// Variant label this job produces.
    pub fn variant_label(&self) -> &str {
        match self {
            QueueJob::Transcode(j) => j.variant_label(),
            QueueJob::Relabel(j) => &j.label,
        }
    }
}

impl From<TranscodeJob> for QueueJob {
    fn from(job: TranscodeJob) -> Self {
        QueueJob::Transcode(job)
    }
}

impl From<RelabelJob> for QueueJob {
    fn from(job: RelabelJob) -> Self {
        QueueJob::Relabel(job)
    }
}
