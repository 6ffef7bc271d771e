//! Prometheus metrics for the pipeline.

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    // Queue metrics
    pub const JOBS_ENQUEUED_TOTAL: &str = "vflix_jobs_enqueued_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "vflix_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vflix_jobs_failed_total";
    pub const JOBS_RESCHEDULED_TOTAL: &str = "vflix_jobs_rescheduled_total";
    pub const ENQUEUE_FAILURES_TOTAL: &str = "vflix_enqueue_failures_total";

    // Artifact metrics
    pub const ARTIFACTS_DELETED_TOTAL: &str = "vflix_artifacts_deleted_total";
    pub const ASSETS_DEGRADED_TOTAL: &str = "vflix_assets_degraded_total";

    // Cache metrics
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "vflix_cache_invalidations_total";
}

/// Serve Prometheus metrics on `addr`.
pub fn install_exporter(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

pub fn record_job_enqueued(operation: &'static str) {
    counter!(names::JOBS_ENQUEUED_TOTAL, "operation" => operation).increment(1);
}

pub fn record_enqueue_failure() {
    counter!(names::ENQUEUE_FAILURES_TOTAL).increment(1);
}

pub fn record_job_completed(operation: &'static str) {
    counter!(names::JOBS_COMPLETED_TOTAL, "operation" => operation).increment(1);
}

/// `dead_lettered` distinguishes final failures from ones that will be retried.
pub fn record_job_failed(operation: &'static str, dead_lettered: bool) {
    let outcome = if dead_lettered { "dead_lettered" } else { "retry" };
    counter!(names::JOBS_FAILED_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
}

pub fn record_job_rescheduled(operation: &'static str) {
    counter!(names::JOBS_RESCHEDULED_TOTAL, "operation" => operation).increment(1);
}

pub fn record_artifact_deleted(kind: &'static str) {
    counter!(names::ARTIFACTS_DELETED_TOTAL, "kind" => kind).increment(1);
}

pub fn record_asset_degraded(reason: &'static str) {
    counter!(names::ASSETS_DEGRADED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_cache_invalidation(trigger: &'static str) {
    counter!(names::CACHE_INVALIDATIONS_TOTAL, "trigger" => trigger).increment(1);
}
