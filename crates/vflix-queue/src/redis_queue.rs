//! Job queue using Redis Streams.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use vflix_models::{JobId, JobState};

use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;
use crate::queue::{Delivery, JobConsumer, JobQueue, QueueConfig};

/// Redis Streams job queue.
///
/// Jobs live in one stream read through a consumer group. Each job also has
/// a status key so producers can ask how far it got.
pub struct RedisJobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisJobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn conn(&self) -> QueueResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn add_to_stream(&self, conn: &mut MultiplexedConnection, job: &QueueJob) -> QueueResult<String> {
        let payload = serde_json::to_string(job)?;
        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .query_async(conn)
            .await?;
        Ok(message_id)
    }

    async fn write_status(
        &self,
        conn: &mut MultiplexedConnection,
        job_id: &JobId,
        state: JobState,
    ) -> QueueResult<()> {
        conn.set_ex::<_, _, ()>(
            self.config.status_key(job_id),
            state.as_str(),
            self.config.status_ttl.as_secs(),
        )
        .await?;
        Ok(())
    }

    /// Decode stream entries, acknowledging payloads that cannot be parsed.
    async fn decode_entries(&self, entries: Vec<StreamId>) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(entries.len());

        for entry in entries {
            let message_id = entry.id.clone();
            let parsed = match entry.map.get("job") {
                Some(redis::Value::BulkString(payload)) => {
                    serde_json::from_slice::<QueueJob>(payload).map_err(|e| e.to_string())
                }
                _ => Err("missing job field".to_string()),
            };

            match parsed {
                Ok(job) => {
                    debug!("Read job {} from stream", job.job_id());
                    deliveries.push(Delivery { message_id, job });
                }
                Err(e) => {
                    warn!("Dropping malformed message {}: {}", message_id, e);
                    self.ack(&message_id).await.ok();
                }
            }
        }

        deliveries
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: QueueJob) -> QueueResult<JobId> {
        let unavailable = |e: QueueError| match e {
            QueueError::Redis(e) => QueueError::unavailable(e.to_string()),
            other => other,
        };

        let mut conn = self.conn().await.map_err(unavailable)?;
        let job_id = job.job_id().clone();

        self.write_status(&mut conn, &job_id, JobState::Pending)
            .await
            .map_err(unavailable)?;
        let message_id = self.add_to_stream(&mut conn, &job).await.map_err(unavailable)?;

        info!(
            job_id = %job_id,
            operation = job.operation(),
            "Enqueued job with message ID {}",
            message_id
        );
        Ok(job_id)
    }

    async fn status(&self, job_id: &JobId) -> QueueResult<Option<JobState>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(self.config.status_key(job_id)).await?;
        Ok(raw.and_then(|s| match s.parse() {
            Ok(state) => Some(state),
            Err(_) => {
                warn!(job_id = %job_id, "Unrecognised job status '{}'", s);
                None
            }
        }))
    }
}

#[async_trait]
impl JobConsumer for RedisJobQueue {
    /// Create the consumer group if it does not exist.
    async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    async fn consume(&self, consumer: &str, block: Duration, count: usize) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = reply
            .unwrap_or_default()
            .keys
            .into_iter()
            .flat_map(|k| k.ids)
            .collect();
        Ok(self.decode_entries(entries).await)
    }

    async fn claim_pending(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle_ms);
        for p in &pending.ids {
            cmd.arg(&p.id);
        }
        let claimed: StreamClaimReply = cmd.query_async(&mut conn).await?;

        let deliveries = self.decode_entries(claimed.ids).await;
        if !deliveries.is_empty() {
            info!("Claimed {} pending jobs for {}", deliveries.len(), consumer);
        }
        Ok(deliveries)
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        conn.del::<_, ()>(self.config.retry_key(message_id)).await?;

        debug!("Acknowledged message: {}", message_id);
        Ok(())
    }

    async fn requeue(&self, delivery: &Delivery, job: QueueJob) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let message_id = self.add_to_stream(&mut conn, &job).await?;
        self.write_status(&mut conn, job.job_id(), JobState::Pending).await?;
        self.ack(&delivery.message_id).await?;

        debug!(
            job_id = %job.job_id(),
            "Requeued message {} as {}",
            delivery.message_id,
            message_id
        );
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&delivery.job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&delivery.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.write_status(&mut conn, delivery.job.job_id(), JobState::DeadLettered)
            .await?;
        self.ack(&delivery.message_id).await?;

        warn!("Moved job {} to DLQ: {}", delivery.job.job_id(), error);
        Ok(())
    }

    async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.conn().await?;

        let key = self.config.retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, 86400).await?;
        Ok(count)
    }

    async fn set_status(&self, job_id: &JobId, state: JobState) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        self.write_status(&mut conn, job_id, state).await
    }

    fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}
