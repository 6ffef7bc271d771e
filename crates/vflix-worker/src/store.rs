//! Asset record store seam.
//!
//! Records are owned by an external collaborator. The pipeline only reads
//! them and hands back [`AssetMutation`]s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use vflix_models::{AssetId, AssetMutation, DegradedReason, MediaAsset};

use crate::error::{WorkerError, WorkerResult};

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Current record, if the store has it.
    async fn get(&self, id: &AssetId) -> WorkerResult<Option<MediaAsset>>;

    /// Apply a mutation produced by the pipeline.
    async fn apply(&self, mutation: AssetMutation) -> WorkerResult<()>;

    async fn mark_degraded(&self, id: &AssetId, reason: DegradedReason) -> WorkerResult<()> {
        self.apply(AssetMutation::MarkDegraded {
            asset_id: id.clone(),
            reason,
        })
        .await
    }
}

/// Store held in memory; also records every mutation it receives.
#[derive(Debug, Default)]
pub struct InMemoryAssetStore {
    assets: RwLock<HashMap<AssetId, MediaAsset>>,
    mutations: RwLock<Vec<AssetMutation>>,
    failing_gets: AtomicU32,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, asset: MediaAsset) {
        self.assets.write().await.insert(asset.id.clone(), asset);
    }

    pub async fn remove(&self, id: &AssetId) -> Option<MediaAsset> {
        self.assets.write().await.remove(id)
    }

    /// Make the next `n` reads fail as if the store were unreachable.
    pub fn fail_next_gets(&self, n: u32) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }

    /// Mutations applied so far, in order.
    pub async fn mutations(&self) -> Vec<AssetMutation> {
        self.mutations.read().await.clone()
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn get(&self, id: &AssetId) -> WorkerResult<Option<MediaAsset>> {
        let failing = self
            .failing_gets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(WorkerError::store("store unavailable"));
        }
        Ok(self.assets.read().await.get(id).cloned())
    }

    async fn apply(&self, mutation: AssetMutation) -> WorkerResult<()> {
        {
            let mut assets = self.assets.write().await;
            let asset = assets
                .get_mut(mutation.asset_id())
                .ok_or_else(|| WorkerError::store(format!("unknown asset {}", mutation.asset_id())))?;
            mutation.apply_to(asset);
        }
        debug!(asset_id = %mutation.asset_id(), "Applied asset mutation");
        self.mutations.write().await.push(mutation);
        Ok(())
    }
}
