//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use vflix_media::{relabel_in_place, TranscodeWorker};
use vflix_models::JobState;
use vflix_queue::{Delivery, JobConsumer, QueueJob, RelabelJob};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::FailureTracker;

/// Shared state of running jobs.
struct JobContext {
    queue: Arc<dyn JobConsumer>,
    transcoder: TranscodeWorker,
    config: WorkerConfig,
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    ctx: Arc<JobContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: Arc<dyn JobConsumer>, transcoder: TranscodeWorker) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            ctx: Arc::new(JobContext {
                queue,
                transcoder,
                config,
            }),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Run until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> WorkerResult<()> {
        let config = &self.ctx.config;
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, config.max_concurrent_jobs
        );

        self.ctx.queue.init().await?;

        let claim_task = self.spawn_claim_task();
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut failures = FailureTracker::new(5);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    match result {
                        Ok(()) => failures.record_success(),
                        Err(e) => {
                            if failures.record_failure() {
                                error!("Error consuming jobs: {}", e);
                            }
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!("In-flight jobs still running after {:?}", config.shutdown_timeout);
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Periodically take over jobs left behind by crashed consumers.
    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ctx.config.claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let claimed = ctx
                            .queue
                            .claim_pending(&consumer_name, ctx.config.claim_min_idle, 5)
                            .await;
                        match claimed {
                            Ok(deliveries) => {
                                for delivery in deliveries {
                                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                        return;
                                    };
                                    let ctx = Arc::clone(&ctx);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        execute_job(ctx, delivery).await;
                                    });
                                }
                            }
                            Err(e) => warn!("Failed to claim pending jobs: {}", e),
                        }
                    }
                }
            }
        })
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .ctx
            .queue
            .consume(&self.consumer_name, Duration::from_secs(1), available.min(5))
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }
        debug!("Consumed {} jobs from queue", deliveries.len());

        for delivery in deliveries {
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;
            let ctx = Arc::clone(&self.ctx);

            tokio::spawn(async move {
                let _permit = permit;
                execute_job(ctx, delivery).await;
            });
        }

        Ok(())
    }

    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.ctx.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Run one delivery to completion on the current task.
    pub async fn execute(&self, delivery: Delivery) {
        execute_job(Arc::clone(&self.ctx), delivery).await;
    }
}

/// Execute a single job with retry, reschedule and DLQ handling.
async fn execute_job(ctx: Arc<JobContext>, delivery: Delivery) {
    let job = &delivery.job;
    let operation = job.operation();
    let logger = JobLogger::new(job.job_id(), operation);
    let span = logger.create_span();

    async {
        logger.log_start(&format!(
            "{} variant {}",
            job.source_path().display(),
            job.variant_label()
        ));
        if let Err(e) = ctx.queue.set_status(job.job_id(), JobState::Processing).await {
            logger.log_warning(&format!("Could not record status: {}", e));
        }

        let result = match tokio::time::timeout(ctx.config.job_timeout, process_job(&ctx, job)).await {
            Ok(result) => result,
            Err(_) => Err(WorkerError::Timeout(ctx.config.job_timeout.as_secs())),
        };

        match result {
            Ok(()) => {
                if let Err(e) = ctx.queue.ack(&delivery.message_id).await {
                    logger.log_error(&format!("Failed to ack: {}", e));
                }
                if let Err(e) = ctx.queue.set_status(job.job_id(), JobState::Completed).await {
                    logger.log_warning(&format!("Could not record status: {}", e));
                }
                metrics::record_job_completed(operation);
                logger.log_completion(job.variant_label());
            }
            Err(e) if e.is_reschedule() => reschedule(&ctx, &delivery, &logger, &e).await,
            Err(e) => fail(&ctx, &delivery, &logger, &e).await,
        }
    }
    .instrument(span)
    .await
}

async fn process_job(ctx: &JobContext, job: &QueueJob) -> WorkerResult<()> {
    match job {
        QueueJob::Transcode(j) => {
            ctx.transcoder.transcode(&j.source_path, &j.target).await?;
        }
        QueueJob::Relabel(j) => {
            wait_for_siblings(ctx, j).await?;
            relabel_in_place(&j.source_path, &j.label).await?;
        }
    }
    Ok(())
}

/// Relabelling moves the source away, so every job still reading it must be done.
async fn wait_for_siblings(ctx: &JobContext, job: &RelabelJob) -> WorkerResult<()> {
    let mut running = 0usize;
    for id in &job.await_jobs {
        match ctx.queue.status(id).await? {
            Some(state) if state.is_terminal() => {}
            Some(_) => running += 1,
            // Status records expire; an unknown job finished long ago.
            None => debug!(job_id = %id, "No status for sibling job"),
        }
    }

    if running > 0 {
        return Err(WorkerError::reschedule(format!(
            "{} of {} sibling jobs still running",
            running,
            job.await_jobs.len()
        )));
    }
    Ok(())
}

async fn reschedule(ctx: &JobContext, delivery: &Delivery, logger: &JobLogger, reason: &WorkerError) {
    let QueueJob::Relabel(job) = &delivery.job else {
        fail(ctx, delivery, logger, reason).await;
        return;
    };

    if job.reschedules >= ctx.config.max_reschedules {
        let message = format!("gave up after {} reschedules: {}", job.reschedules, reason);
        logger.log_error(&message);
        metrics::record_job_failed(delivery.job.operation(), true);
        if let Err(e) = ctx.queue.dead_letter(delivery, &message).await {
            logger.log_error(&format!("Failed to move to DLQ: {}", e));
        }
        return;
    }

    logger.log_progress(&format!("rescheduling: {}", reason));
    tokio::time::sleep(ctx.config.reschedule_delay).await;

    match ctx
        .queue
        .requeue(delivery, QueueJob::Relabel(job.rescheduled()))
        .await
    {
        Ok(()) => metrics::record_job_rescheduled(delivery.job.operation()),
        Err(e) => logger.log_error(&format!("Failed to reschedule: {}", e)),
    }
}

async fn fail(ctx: &JobContext, delivery: &Delivery, logger: &JobLogger, err: &WorkerError) {
    logger.log_error(&err.to_string());
    let operation = delivery.job.operation();

    let attempts = match ctx.queue.increment_retry(&delivery.message_id).await {
        Ok(n) => n,
        Err(e) => {
            logger.log_warning(&format!("Could not read retry count: {}", e));
            u32::MAX
        }
    };
    let max_retries = ctx.queue.max_retries();

    if !err.is_retryable() || attempts >= max_retries {
        warn!(
            attempts,
            max_retries,
            retryable = err.is_retryable(),
            "Moving job to DLQ"
        );
        metrics::record_job_failed(operation, true);
        if let Err(e) = ctx.queue.dead_letter(delivery, &err.to_string()).await {
            logger.log_error(&format!("Failed to move to DLQ: {}", e));
        }
        return;
    }

    metrics::record_job_failed(operation, false);
    if let Err(e) = ctx.queue.set_status(delivery.job.job_id(), JobState::Failed).await {
        logger.log_warning(&format!("Could not record status: {}", e));
    }
    // Left unacknowledged; the claim task redelivers it once idle.
    logger.log_progress(&format!("will be retried (attempt {}/{})", attempts, max_retries));
}
