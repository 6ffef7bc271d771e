//! Routes lifecycle events to the ingestion trigger and deletion handler.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use vflix_cache::ResponseCache;
use vflix_media::FrameExtractor;
use vflix_models::AssetEvent;
use vflix_queue::JobQueue;

use crate::config::PipelineConfig;
use crate::deletion::DeletionHandler;
use crate::error::WorkerResult;
use crate::events::EventReceiver;
use crate::ingestion::IngestionTrigger;
use crate::store::AssetStore;

pub struct Pipeline {
    ingestion: IngestionTrigger,
    deletion: DeletionHandler,
}

impl Pipeline {
    pub fn new(
        config: Arc<PipelineConfig>,
        extractor: Arc<dyn FrameExtractor>,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn AssetStore>,
        cache: Arc<dyn ResponseCache>,
    ) -> Self {
        Self {
            ingestion: IngestionTrigger::new(
                Arc::clone(&config),
                extractor,
                queue,
                store,
                Arc::clone(&cache),
            ),
            deletion: DeletionHandler::new(config, cache),
        }
    }

    pub fn ingestion(&self) -> &IngestionTrigger {
        &self.ingestion
    }

    pub fn deletion(&self) -> &DeletionHandler {
        &self.deletion
    }

    /// Handle one event to completion.
    pub async fn handle(&self, event: &AssetEvent) -> WorkerResult<()> {
        match event {
            AssetEvent::Created(created) => {
                self.ingestion.handle(created).await?;
            }
            AssetEvent::Deleted(deleted) => {
                self.deletion.handle(deleted).await;
            }
        }
        Ok(())
    }

    /// Consume events until the bus closes or shutdown is signalled.
    ///
    /// Events are handled one at a time in arrival order. While an event is
    /// being handled, publishers wait once the bus is full.
    pub async fn run(
        &self,
        mut events: EventReceiver,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Pipeline listening for asset events");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received, stopping pipeline");
                        break;
                    }
                }
                received = events.recv() => {
                    let Some(event) = received else {
                        info!("Event bus closed, stopping pipeline");
                        break;
                    };
                    if let Err(e) = self.handle(&event).await {
                        error!(
                            asset_id = %event.asset_id(),
                            kind = event.kind(),
                            "Failed to handle asset event: {}",
                            e
                        );
                    }
                }
            }
        }
    }
}
