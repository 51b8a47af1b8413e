//! Checkpoint manager. Records the height range each sync run completed.
//!
//! Checkpoints are append-only. A new run starts one past the highest end
//! height ever recorded, or at the protocol activation height on a fresh
//! store. A run that fails part-way still records the prefix it completed,
//! so the next run resumes right after the last committed block.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// One completed (possibly partial) sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    /// First height the run attempted.
    pub start_height: u64,
    /// Last height the run committed.
    pub end_height: u64,
    /// Wall-clock duration of the run in seconds.
    pub duration_secs: f64,
    /// Unix timestamp of when this checkpoint was recorded.
    pub recorded_at: i64,
}

/// Trait for persisting checkpoints.
///
/// Implemented by the memory, SQLite and Postgres backends in
/// `spaces-storage`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Highest `end_height` ever recorded, if any.
    async fn last_end_height(&self) -> Result<Option<u64>, IndexerError>;

    /// Append a checkpoint.
    async fn record(&self, checkpoint: SyncCheckpoint) -> Result<(), IndexerError>;

    /// All checkpoints in the order they were recorded.
    async fn list(&self) -> Result<Vec<SyncCheckpoint>, IndexerError>;
}

/// Computes where a run starts and records where it ended.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    activation_height: u64,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>, activation_height: u64) -> Self {
        Self {
            store,
            activation_height,
        }
    }

    /// The first height the next run should process.
    pub async fn resume_height(&self) -> Result<u64, IndexerError> {
        Ok(match self.store.last_end_height().await? {
            Some(end) => end + 1,
            None => self.activation_height,
        })
    }

    /// Record that heights `start..=end` were committed in `elapsed`.
    pub async fn record_run(
        &self,
        start: u64,
        end: u64,
        elapsed: Duration,
    ) -> Result<SyncCheckpoint, IndexerError> {
        let cp = SyncCheckpoint {
            start_height: start,
            end_height: end,
            duration_secs: elapsed.as_secs_f64(),
            recorded_at: chrono::Utc::now().timestamp(),
        };
        self.store.record(cp.clone()).await?;
        Ok(cp)
    }
}
