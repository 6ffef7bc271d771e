//! In-process job queue.
//!
//! Same semantics as the Redis queue without a broker. Used by tests and by
//! single-process deployments that do not need durability across restarts.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};
use vflix_models::{JobId, JobState};

use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;
use crate::queue::{Delivery, JobConsumer, JobQueue};

#[derive(Debug, Default)]
struct State {
    ready: VecDeque<Delivery>,
    in_flight: HashMap<String, (Delivery, Instant)>,
    statuses: HashMap<JobId, JobState>,
    retries: HashMap<String, u32>,
    dead: Vec<(QueueJob, String)>,
    history: Vec<QueueJob>,
    next_seq: u64,
}

impl State {
    fn push(&mut self, job: QueueJob) -> String {
        self.next_seq += 1;
        let message_id = format!("{}-0", self.next_seq);
        self.ready.push_back(Delivery {
            message_id: message_id.clone(),
            job,
        });
        message_id
    }
}

/// Job queue held in memory.
#[derive(Debug)]
pub struct InMemoryJobQueue {
    state: Mutex<State>,
    notify: Notify,
    max_retries: u32,
    failing_enqueues: AtomicU32,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            max_retries: 3,
            failing_enqueues: AtomicU32::new(0),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Reject the next `n` enqueue calls as if the broker were down.
    pub fn fail_next_enqueues(&self, n: u32) {
        self.failing_enqueues.store(n, Ordering::SeqCst);
    }

    /// Every job accepted so far, in submission order.
    pub async fn enqueued(&self) -> Vec<QueueJob> {
        self.state.lock().await.history.clone()
    }

    /// Jobs waiting to be consumed.
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Jobs consumed but not yet settled.
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Dead-lettered jobs with the error that put them there.
    pub async fn dead_letters(&self) -> Vec<(QueueJob, String)> {
        self.state.lock().await.dead.clone()
    }

    async fn take_ready(&self, count: usize) -> Vec<Delivery> {
        let mut state = self.state.lock().await;
        let n = count.min(state.ready.len());
        let taken: Vec<Delivery> = state.ready.drain(..n).collect();
        let now = Instant::now();
        for d in &taken {
            state
                .in_flight
                .insert(d.message_id.clone(), (d.clone(), now));
        }
        taken
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: QueueJob) -> QueueResult<JobId> {
        let failing = self
            .failing_enqueues
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(QueueError::unavailable("in-memory queue rejecting enqueues"));
        }

        let job_id = job.job_id().clone();
        {
            let mut state = self.state.lock().await;
            state.statuses.insert(job_id.clone(), JobState::Pending);
            state.history.push(job.clone());
            let message_id = state.push(job);
            debug!(job_id = %job_id, "Enqueued in-memory message {}", message_id);
        }
        self.notify.notify_one();
        Ok(job_id)
    }

    async fn status(&self, job_id: &JobId) -> QueueResult<Option<JobState>> {
        Ok(self.state.lock().await.statuses.get(job_id).copied())
    }
}

#[async_trait]
impl JobConsumer for InMemoryJobQueue {
    async fn consume(&self, _consumer: &str, block: Duration, count: usize) -> QueueResult<Vec<Delivery>> {
        let taken = self.take_ready(count).await;
        if !taken.is_empty() || block.is_zero() {
            return Ok(taken);
        }
        let _ = tokio::time::timeout(block, self.notify.notified()).await;
        Ok(self.take_ready(count).await)
    }

    async fn claim_pending(
        &self,
        _consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let mut claimed = Vec::new();
        for (delivery, since) in state.in_flight.values_mut() {
            if claimed.len() >= count {
                break;
            }
            if now.duration_since(*since) >= min_idle {
                *since = now;
                claimed.push(delivery.clone());
            }
        }
        Ok(claimed)
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        state.in_flight.remove(message_id);
        state.retries.remove(message_id);
        Ok(())
    }

    async fn requeue(&self, delivery: &Delivery, job: QueueJob) -> QueueResult<()> {
        {
            let mut state = self.state.lock().await;
            state.in_flight.remove(&delivery.message_id);
            state.retries.remove(&delivery.message_id);
            state.statuses.insert(job.job_id().clone(), JobState::Pending);
            state.push(job);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&delivery.message_id);
        state.retries.remove(&delivery.message_id);
        state
            .statuses
            .insert(delivery.job.job_id().clone(), JobState::DeadLettered);
        state.dead.push((delivery.job.clone(), error.to_string()));
        warn!("Moved job {} to in-memory DLQ: {}", delivery.job.job_id(), error);
        Ok(())
    }

    async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut state = self.state.lock().await;
        let count = state.retries.entry(message_id.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn set_status(&self, job_id: &JobId, state: JobState) -> QueueResult<()> {
        self.state.lock().await.statuses.insert(job_id.clone(), state);
        Ok(())
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::TranscodeJob;
    use vflix_models::{AssetId, ResolutionTarget};

    fn job(label: &str) -> QueueJob {
        TranscodeJob::new(
            AssetId::from("a1"),
            "/media/movie.mp4",
            ResolutionTarget::preset(label).unwrap(),
        )
        .into()
    }

    #[tokio::test]
    async fn test_enqueue_consume_ack() {
        let queue = InMemoryJobQueue::new();
        let id = queue.enqueue(job("720p")).await.unwrap();
        assert_eq!(queue.status(&id).await.unwrap(), Some(JobState::Pending));

        let batch = queue.consume("w1", Duration::ZERO, 5).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(queue.in_flight_len().await, 1);

        queue.ack(&batch[0].message_id).await.unwrap();
        assert_eq!(queue.in_flight_len().await, 0);
        assert_eq!(queue.ready_len().await, 0);
    }

    #[tokio::test]
    async fn test_unavailable_enqueue() {
        let queue = InMemoryJobQueue::new();
        queue.fail_next_enqueues(1);

        let err = queue.enqueue(job("480p")).await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(queue.enqueued().await.is_empty());

        queue.enqueue(job("480p")).await.unwrap();
        assert_eq!(queue.enqueued().await.len(), 1);
    }

    #[tokio::test]
    async fn test_consume_waits_for_enqueue() {
        let queue = std::sync::Arc::new(InMemoryJobQueue::new());
        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.enqueue(job("360p")).await.unwrap();
        });

        let batch = queue.consume("w1", Duration::from_secs(2), 1).await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_unacked_jobs_can_be_claimed() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue(job("720p")).await.unwrap();
        let first = queue.consume("w1", Duration::ZERO, 1).await.unwrap();

        let claimed = queue.claim_pending("w2", Duration::ZERO, 5).await.unwrap();
        assert_eq!(claimed, first);
    }

    #[tokio::test]
    async fn test_dead_letter_records_state() {
        let queue = InMemoryJobQueue::new().with_max_retries(1);
        let id = queue.enqueue(job("720p")).await.unwrap();
        let delivery = queue.consume("w1", Duration::ZERO, 1).await.unwrap().remove(0);

        assert_eq!(queue.increment_retry(&delivery.message_id).await.unwrap(), 1);
        queue.dead_letter(&delivery, "boom").await.unwrap();

        assert_eq!(queue.status(&id).await.unwrap(), Some(JobState::DeadLettered));
        assert_eq!(queue.dead_letters().await.len(), 1);
        assert_eq!(queue.in_flight_len().await, 0);
    }
}
