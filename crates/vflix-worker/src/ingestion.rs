//! Reaction to newly created assets.
//!
//! For each created asset the trigger:
//! 1. extracts a thumbnail if none is recorded, and stores its path
//! 2. enqueues one transcode job per configured rendition (plus the
//!    optional relabel job)
//! 3. invalidates the response cache
//!
//! Step 1 is awaited before anything is enqueued. Tool, queue and record store
//! failures never fail the event or skip a later step; they raise degraded
//! flags on the asset or are logged.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use vflix_cache::ResponseCache;
use vflix_media::FrameExtractor;
use vflix_models::{AssetCreated, AssetId, AssetMutation, DegradedReason, JobId};
use vflix_queue::{JobQueue, QueueError, QueueJob, RelabelJob, TranscodeJob};

use crate::config::PipelineConfig;
use crate::error::WorkerResult;
use crate::invalidation::invalidate_after;
use crate::metrics;
use crate::retry::{retry_async, RetryExhausted};
use crate::store::AssetStore;

/// What happened to the thumbnail step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailOutcome {
    /// A path was already recorded; nothing was extracted.
    AlreadyPresent,
    /// Extracted and recorded under this path.
    Extracted(PathBuf),
    /// Extracted to this path, but the record store did not take it.
    Unrecorded(PathBuf),
    Failed,
}

#[derive(Debug, Clone)]
pub struct IngestionReport {
    pub asset_id: AssetId,
    pub thumbnail: ThumbnailOutcome,
    /// Transcode jobs accepted by the queue, in rendition order
    pub transcode_jobs: Vec<JobId>,
    pub relabel_job: Option<JobId>,
    pub degraded: Vec<DegradedReason>,
    pub cache_invalidated: bool,
}

impl IngestionReport {
    fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            thumbnail: ThumbnailOutcome::AlreadyPresent,
            transcode_jobs: Vec::new(),
            relabel_job: None,
            degraded: Vec::new(),
            cache_invalidated: false,
        }
    }
}

pub struct IngestionTrigger {
    config: Arc<PipelineConfig>,
    extractor: Arc<dyn FrameExtractor>,
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn AssetStore>,
    cache: Arc<dyn ResponseCache>,
}

impl IngestionTrigger {
    pub fn new(
        config: Arc<PipelineConfig>,
        extractor: Arc<dyn FrameExtractor>,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn AssetStore>,
        cache: Arc<dyn ResponseCache>,
    ) -> Self {
        Self {
            config,
            extractor,
            queue,
            store,
            cache,
        }
    }

    pub async fn handle(&self, event: &AssetCreated) -> WorkerResult<IngestionReport> {
        let mut report = IngestionReport::new(event.id.clone());

        report.thumbnail = self.ensure_thumbnail(event, &mut report).await;
        self.enqueue_jobs(event, &mut report).await;
        report.cache_invalidated =
            invalidate_after(self.cache.as_ref(), self.config.cache_policy, "created").await;

        info!(
            asset_id = %event.id,
            transcodes = report.transcode_jobs.len(),
            relabel = report.relabel_job.is_some(),
            degraded = report.degraded.len(),
            "Ingested asset"
        );
        Ok(report)
    }

    async fn ensure_thumbnail(
        &self,
        event: &AssetCreated,
        report: &mut IngestionReport,
    ) -> ThumbnailOutcome {
        if self.has_thumbnail(event).await {
            return ThumbnailOutcome::AlreadyPresent;
        }

        let extracted = match self
            .extractor
            .extract(&event.source_path, &self.config.thumbnail)
            .await
        {
            Ok(path) => path,
            Err(e) => {
                warn!(
                    asset_id = %event.id,
                    source = %event.source_path.display(),
                    "Thumbnail extraction failed: {}",
                    e
                );
                self.degrade(&event.id, DegradedReason::ThumbnailFailed, report).await;
                return ThumbnailOutcome::Failed;
            }
        };

        let stored = self.config.stored_thumbnail_path(&extracted);
        let recorded = self
            .store
            .apply(AssetMutation::SetThumbnailPath {
                asset_id: event.id.clone(),
                path: stored.clone(),
            })
            .await;
        match recorded {
            Ok(()) => ThumbnailOutcome::Extracted(stored),
            Err(e) => {
                error!(
                    asset_id = %event.id,
                    path = %stored.display(),
                    "Could not record thumbnail path: {}",
                    e
                );
                ThumbnailOutcome::Unrecorded(stored)
            }
        }
    }

    /// An unreadable record counts as having no thumbnail; extraction overwrites.
    async fn has_thumbnail(&self, event: &AssetCreated) -> bool {
        let on_event = event
            .thumbnail_path
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty());
        if on_event {
            return true;
        }
        match self.store.get(&event.id).await {
            Ok(asset) => asset.is_some_and(|asset| asset.has_thumbnail()),
            Err(e) => {
                warn!(asset_id = %event.id, "Could not read asset record: {}", e);
                false
            }
        }
    }

    async fn enqueue_jobs(&self, event: &AssetCreated, report: &mut IngestionReport) {
        let source = &event.source_path;

        // Every variant path must be derivable before any job is handed out.
        if let Err(e) = self
            .config
            .deriver()
            .variant_paths(source, self.config.variant_labels())
        {
            warn!(asset_id = %event.id, "Not enqueuing transcodes: {}", e);
            self.degrade(&event.id, DegradedReason::InvalidSourcePath, report).await;
            return;
        }

        for target in &self.config.renditions {
            let job = TranscodeJob::new(event.id.clone(), source.clone(), target.clone());
            match self.submit(job.into()).await {
                Ok(job_id) => report.transcode_jobs.push(job_id),
                Err(e) => {
                    error!(
                        asset_id = %event.id,
                        variant = %target.label,
                        attempts = e.attempts,
                        "Enqueue failed: {}",
                        e.error
                    );
                    self.degrade(&event.id, DegradedReason::PendingTranscode, report).await;
                    return;
                }
            }
        }

        if let Some(label) = &self.config.relabel_original_as {
            let job = RelabelJob::new(
                event.id.clone(),
                source.clone(),
                label.clone(),
                report.transcode_jobs.clone(),
            );
            match self.submit(job.into()).await {
                Ok(job_id) => report.relabel_job = Some(job_id),
                Err(e) => {
                    error!(asset_id = %event.id, "Relabel enqueue failed: {}", e.error);
                    self.degrade(&event.id, DegradedReason::PendingTranscode, report).await;
                }
            }
        }
    }

    /// Enqueue with backoff while the queue reports itself unavailable.
    async fn submit(&self, job: QueueJob) -> Result<JobId, RetryExhausted<QueueError>> {
        let operation = job.operation();
        let result = retry_async(
            &self.config.enqueue_retry,
            QueueError::is_unavailable,
            || self.queue.enqueue(job.clone()),
        )
        .await;

        match &result {
            Ok(_) => metrics::record_job_enqueued(operation),
            Err(_) => metrics::record_enqueue_failure(),
        }
        result
    }

    async fn degrade(&self, id: &AssetId, reason: DegradedReason, report: &mut IngestionReport) {
        if !report.degraded.contains(&reason) {
            report.degraded.push(reason);
        }
        metrics::record_asset_degraded(reason.as_str());
        if let Err(e) = self.store.mark_degraded(id, reason).await {
            error!(asset_id = %id, reason = %reason, "Could not record degraded state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use vflix_cache::{CachePolicy, InMemoryResponseCache};
    use vflix_media::{MediaError, MediaResult};
    use vflix_models::{AssetCategory, MediaAsset, ThumbnailSpec};
    use vflix_queue::InMemoryJobQueue;

    use crate::retry::RetryConfig;
    use crate::store::InMemoryAssetStore;

    /// Records calls and answers with the thumbnail path a real run would write.
    #[derive(Default)]
    struct RecordingExtractor {
        calls: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    #[async_trait]
    impl FrameExtractor for RecordingExtractor {
        async fn extract(&self, source: &Path, _spec: &ThumbnailSpec) -> MediaResult<PathBuf> {
            self.calls.lock().await.push(source.to_path_buf());
            if self.fail {
                return Err(MediaError::external_tool("ffmpeg", "exit status 1", Some(1), None));
            }
            let stem = source.file_stem().and_then(|s| s.to_str()).unwrap_or("x");
            Ok(PathBuf::from("/media/thumbnails").join(format!("{stem}.jpg")))
        }
    }

    struct Harness {
        trigger: IngestionTrigger,
        extractor: Arc<RecordingExtractor>,
        queue: Arc<InMemoryJobQueue>,
        store: Arc<InMemoryAssetStore>,
        cache: Arc<InMemoryResponseCache>,
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            media_root: PathBuf::from("/media"),
            thumbnail_dir: PathBuf::from("/media/thumbnails"),
            enqueue_retry: RetryConfig::new("enqueue")
                .with_max_retries(2)
                .with_base_delay(Duration::from_millis(1)),
            ..PipelineConfig::default()
        }
    }

    fn harness(config: PipelineConfig, extractor: RecordingExtractor) -> Harness {
        let extractor = Arc::new(extractor);
        let queue = Arc::new(InMemoryJobQueue::new());
        let store = Arc::new(InMemoryAssetStore::new());
        let cache = Arc::new(InMemoryResponseCache::default());
        let trigger = IngestionTrigger::new(
            Arc::new(config),
            extractor.clone(),
            queue.clone(),
            store.clone(),
            cache.clone(),
        );
        Harness {
            trigger,
            extractor,
            queue,
            store,
            cache,
        }
    }

    async fn created(h: &Harness, source: &str) -> AssetCreated {
        let asset = MediaAsset::new(source, AssetCategory::Chess).with_id("a1");
        let event = AssetCreated::from(&asset);
        h.store.insert(asset).await;
        event
    }

    fn labels(jobs: &[QueueJob]) -> Vec<String> {
        jobs.iter().map(|j| j.variant_label().to_string()).collect()
    }

    #[tokio::test]
    async fn test_movie_example() {
        let h = harness(config(), RecordingExtractor::default());
        let event = created(&h, "/media/videos/movie.mp4").await;

        let report = h.trigger.handle(&event).await.unwrap();

        assert_eq!(
            report.thumbnail,
            ThumbnailOutcome::Extracted(PathBuf::from("thumbnails/movie.jpg"))
        );
        assert_eq!(*h.extractor.calls.lock().await, vec![PathBuf::from("/media/videos/movie.mp4")]);

        let jobs = h.queue.enqueued().await;
        assert_eq!(labels(&jobs), ["480p", "720p"]);
        assert!(jobs
            .iter()
            .all(|j| j.source_path() == Path::new("/media/videos/movie.mp4")));
        assert_eq!(report.transcode_jobs.len(), 2);
        assert!(report.degraded.is_empty());

        let stored = h.store.get(&event.id).await.unwrap().unwrap();
        assert_eq!(stored.thumbnail_path, Some(PathBuf::from("thumbnails/movie.jpg")));
    }

    #[tokio::test]
    async fn test_one_enqueue_per_configured_rendition() {
        let config = PipelineConfig {
            renditions: vflix_models::ResolutionTarget::parse_list("120p,360p,720p,small=320x180")
                .unwrap(),
            ..config()
        };
        let h = harness(config, RecordingExtractor::default());
        let event = created(&h, "/media/videos/clip.mov").await;

        h.trigger.handle(&event).await.unwrap();

        assert_eq!(labels(&h.queue.enqueued().await), ["120p", "360p", "720p", "small"]);
    }

    #[tokio::test]
    async fn test_existing_thumbnail_is_not_extracted_again() {
        let h = harness(config(), RecordingExtractor::default());
        let event = created(&h, "/media/videos/movie.mp4").await;

        h.trigger.handle(&event).await.unwrap();
        let second = h.trigger.handle(&event).await.unwrap();

        assert_eq!(second.thumbnail, ThumbnailOutcome::AlreadyPresent);
        assert_eq!(h.extractor.calls.lock().await.len(), 1);
        let set_calls = h
            .store
            .mutations()
            .await
            .into_iter()
            .filter(|m| matches!(m, AssetMutation::SetThumbnailPath { .. }))
            .count();
        assert_eq!(set_calls, 1);
    }

    #[tokio::test]
    async fn test_thumbnail_failure_still_enqueues() {
        let extractor = RecordingExtractor {
            fail: true,
            ..Default::default()
        };
        let h = harness(config(), extractor);
        let event = created(&h, "/media/videos/movie.mp4").await;

        let report = h.trigger.handle(&event).await.unwrap();

        assert_eq!(report.thumbnail, ThumbnailOutcome::Failed);
        assert_eq!(report.transcode_jobs.len(), 2);
        let stored = h.store.get(&event.id).await.unwrap().unwrap();
        assert_eq!(stored.thumbnail_path, None);
        assert_eq!(stored.degraded, vec![DegradedReason::ThumbnailFailed]);
    }

    #[tokio::test]
    async fn test_transient_queue_outage_is_retried() {
        let h = harness(config(), RecordingExtractor::default());
        h.queue.fail_next_enqueues(2);
        let event = created(&h, "/media/videos/movie.mp4").await;

        let report = h.trigger.handle(&event).await.unwrap();

        assert_eq!(report.transcode_jobs.len(), 2);
        assert!(report.degraded.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_mark_pending_transcode() {
        let h = harness(config(), RecordingExtractor::default());
        h.queue.fail_next_enqueues(100);
        let event = created(&h, "/media/videos/movie.mp4").await;

        let report = h.trigger.handle(&event).await.unwrap();

        assert!(report.transcode_jobs.is_empty());
        assert_eq!(report.degraded, vec![DegradedReason::PendingTranscode]);
        let stored = h.store.get(&event.id).await.unwrap().unwrap();
        assert!(stored.degraded.contains(&DegradedReason::PendingTranscode));
        // The record itself and its thumbnail are unaffected.
        assert!(stored.has_thumbnail());
    }

    #[tokio::test]
    async fn test_extensionless_source_enqueues_nothing() {
        let h = harness(config(), RecordingExtractor::default());
        let event = created(&h, "/media/videos/movie").await;

        let report = h.trigger.handle(&event).await.unwrap();

        assert!(h.queue.enqueued().await.is_empty());
        assert_eq!(report.degraded, vec![DegradedReason::InvalidSourcePath]);
    }

    #[tokio::test]
    async fn test_relabel_job_waits_on_transcodes() {
        let config = PipelineConfig {
            relabel_original_as: Some("1080p".to_string()),
            ..config()
        };
        let h = harness(config, RecordingExtractor::default());
        let event = created(&h, "/media/videos/movie.mp4").await;

        let report = h.trigger.handle(&event).await.unwrap();

        let jobs = h.queue.enqueued().await;
        assert_eq!(labels(&jobs), ["480p", "720p", "1080p"]);
        match jobs.last() {
            Some(QueueJob::Relabel(relabel)) => {
                assert_eq!(relabel.await_jobs, report.transcode_jobs);
                assert_eq!(Some(&relabel.job_id), report.relabel_job.as_ref());
            }
            other => panic!("expected relabel job, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cache_is_cleared_per_policy() {
        let h = harness(config(), RecordingExtractor::default());
        h.cache.set("videos:list", b"[]".to_vec(), None).await.unwrap();
        let event = created(&h, "/media/videos/movie.mp4").await;

        let report = h.trigger.handle(&event).await.unwrap();
        assert!(report.cache_invalidated);
        assert_eq!(h.cache.get("videos:list").await.unwrap(), None);

        let config = PipelineConfig {
            cache_policy: CachePolicy::None,
            ..config()
        };
        let h = harness(config, RecordingExtractor::default());
        h.cache.set("videos:list", b"[]".to_vec(), None).await.unwrap();
        let event = created(&h, "/media/videos/movie.mp4").await;

        let report = h.trigger.handle(&event).await.unwrap();
        assert!(!report.cache_invalidated);
        assert!(h.cache.get("videos:list").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_record_still_enqueues_and_invalidates() {
        let h = harness(config(), RecordingExtractor::default());
        h.cache.set("videos:list", b"[]".to_vec(), None).await.unwrap();
        // Not inserted into the store, so recording the thumbnail fails.
        let event = AssetCreated::from(&MediaAsset::new("/media/videos/movie.mp4", AssetCategory::Chess));

        let report = h.trigger.handle(&event).await.unwrap();

        assert_eq!(
            report.thumbnail,
            ThumbnailOutcome::Unrecorded(PathBuf::from("thumbnails/movie.jpg"))
        );
        assert_eq!(labels(&h.queue.enqueued().await), ["480p", "720p"]);
        assert!(report.cache_invalidated);
        assert_eq!(h.cache.get("videos:list").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreadable_record_extracts_and_enqueues() {
        let h = harness(config(), RecordingExtractor::default());
        let event = created(&h, "/media/videos/movie.mp4").await;
        h.store.fail_next_gets(1);

        let report = h.trigger.handle(&event).await.unwrap();

        assert_eq!(
            report.thumbnail,
            ThumbnailOutcome::Extracted(PathBuf::from("thumbnails/movie.jpg"))
        );
        assert_eq!(h.extractor.calls.lock().await.len(), 1);
        assert_eq!(report.transcode_jobs.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_cache_clear_does_not_fail_ingestion() {
        let h = harness(config(), RecordingExtractor::default());
        h.cache.set("videos:list", b"[]".to_vec(), None).await.unwrap();
        h.cache.fail_next_clears(1);
        let event = created(&h, "/media/videos/movie.mp4").await;

        let report = h.trigger.handle(&event).await.unwrap();

        assert!(!report.cache_invalidated);
        assert_eq!(report.transcode_jobs.len(), 2);
        assert!(h.cache.get("videos:list").await.unwrap().is_some());
    }
}
