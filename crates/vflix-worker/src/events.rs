//! In-process lifecycle event bus.
//!
//! Bounded and lossless: when the pipeline falls behind, publishers wait for
//! room instead of events being dropped.

use tokio::sync::mpsc;
use tracing::debug;
use vflix_models::AssetEvent;

use crate::error::{WorkerError, WorkerResult};

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Receiving end consumed by [`Pipeline::run`](crate::pipeline::Pipeline::run).
pub type EventReceiver = mpsc::Receiver<AssetEvent>;

/// Channel the record store publishes lifecycle events on.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::Sender<AssetEvent>,
}

impl EventBus {
    /// Create a bus and the single receiver that drains it.
    pub fn new(capacity: usize) -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn with_default_capacity() -> (Self, EventReceiver) {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }

    /// Publish an event, waiting while the bus is full.
    ///
    /// Fails only when the receiver has been dropped.
    pub async fn publish(&self, event: AssetEvent) -> WorkerResult<()> {
        let asset_id = event.asset_id().clone();
        let kind = event.kind();
        self.tx
            .send(event)
            .await
            .map_err(|_| WorkerError::EventBusClosed)?;
        debug!(asset_id = %asset_id, kind, "Published asset event");
        Ok(())
    }

    /// Free slots before `publish` starts waiting.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}
