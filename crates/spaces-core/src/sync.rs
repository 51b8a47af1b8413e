//! The sync driver: one pass from the last checkpoint to the chain tip.
//!
//! ```text
//! try_lock ──(held elsewhere)──▶ Locked
//!    │
//! resume_height ─▶ tip ──(start > tip)──▶ UpToDate
//!    │
//! for height in start..=tip:  block_at → relevant_transactions → process_block
//!    │                         (first error stops the loop)
//! record checkpoint for the committed prefix
//!    │
//! unlock (always)
//! ```
//!
//! Heights are processed strictly in order: lifecycle decisions read the
//! history written by earlier blocks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointManager, CheckpointStore};
use crate::config::SyncConfig;
use crate::error::IndexerError;
use crate::ingest::{BlockReceipt, Ingestor};
use crate::lock::RunLock;
use crate::source::BlockSource;
use crate::store::SpaceStore;

/// What a single run accomplished.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub start_height: u64,
    pub end_height: u64,
    /// Blocks that had protocol activity and were stored.
    pub blocks_stored: usize,
    pub history_rows: usize,
    pub duration: Duration,
}

/// Result of [`SyncDriver::run`] when no error stopped it.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Another instance holds the advisory lock; nothing was done.
    Locked,
    /// The store is already at the tip.
    UpToDate { start: u64, tip: u64 },
    Synced(RunSummary),
}

/// Drives block ingestion height by height.
pub struct SyncDriver<B> {
    config: SyncConfig,
    source: B,
    ingestor: Ingestor,
    checkpoints: CheckpointManager,
    lock: Arc<dyn RunLock>,
}

impl<B: BlockSource> SyncDriver<B> {
    /// Build a driver over a backend that provides ingestion, checkpoints
    /// and the advisory lock.
    pub fn new<S>(config: SyncConfig, source: B, store: Arc<S>) -> Self
    where
        S: SpaceStore + CheckpointStore + RunLock + 'static,
    {
        Self::from_parts(config, source, store.clone(), store.clone(), store)
    }

    /// Build a driver from separately supplied collaborators.
    pub fn from_parts(
        config: SyncConfig,
        source: B,
        store: Arc<dyn SpaceStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        lock: Arc<dyn RunLock>,
    ) -> Self {
        Self {
            checkpoints: CheckpointManager::new(checkpoints, config.activation_height),
            ingestor: Ingestor::new(store),
            lock,
            source,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one sync pass.
    ///
    /// Lock contention is reported as [`SyncOutcome::Locked`], not as an
    /// error. Any fetch or ingestion error stops the pass and is returned
    /// after the completed prefix has been checkpointed.
    pub async fn run(&self) -> Result<SyncOutcome, IndexerError> {
        let lock_name = self.config.lock_name.as_str();
        if !self.lock.try_lock(lock_name).await? {
            warn!(lock = lock_name, "another sync run holds the lock, exiting");
            return Ok(SyncOutcome::Locked);
        }

        let result = self.run_locked().await;

        match self.lock.unlock(lock_name).await {
            Ok(()) => result,
            Err(e) => {
                error!(lock = lock_name, error = %e, "failed to release sync lock");
                // A failed run keeps its own error.
                result.and(Err(e))
            }
        }
    }

    async fn run_locked(&self) -> Result<SyncOutcome, IndexerError> {
        let started = Instant::now();
        let start = self.checkpoints.resume_height().await?;
        let tip = self.source.tip_height().await?;

        if start > tip {
            info!(start, tip, "already at chain tip");
            return Ok(SyncOutcome::UpToDate { start, tip });
        }

        let target = match self.config.max_blocks_per_run {
            Some(n) => tip.min(start.saturating_add(n.max(1) - 1)),
            None => tip,
        };
        info!(start, target, tip, "sync started");

        let mut last_ok = None;
        let mut blocks_stored = 0;
        let mut history_rows = 0;
        let mut failure = None;

        for height in start..=target {
            match self.sync_height(height).await {
                Ok(receipt) => {
                    last_ok = Some(height);
                    if let Some(r) = receipt {
                        blocks_stored += 1;
                        history_rows += r.history_rows;
                    }
                }
                Err(e) => {
                    error!(height, error = %e, "sync stopped");
                    failure = Some(e);
                    break;
                }
            }
        }

        let duration = started.elapsed();
        let recorded = match last_ok {
            Some(end) => Some(self.checkpoints.record_run(start, end, duration).await),
            None => None,
        };

        if let Some(e) = failure {
            if let Some(Err(cp_err)) = recorded {
                error!(error = %cp_err, "failed to record checkpoint after sync error");
            }
            return Err(e);
        }
        if let Some(Err(cp_err)) = recorded {
            return Err(cp_err);
        }

        let summary = RunSummary {
            start_height: start,
            end_height: target,
            blocks_stored,
            history_rows,
            duration,
        };
        info!(
            start = summary.start_height,
            end = summary.end_height,
            blocks = summary.blocks_stored,
            history = summary.history_rows,
            secs = summary.duration.as_secs_f64(),
            "sync finished"
        );
        Ok(SyncOutcome::Synced(summary))
    }

    async fn sync_height(&self, height: u64) -> Result<Option<BlockReceipt>, IndexerError> {
        let block = self.source.block_at(height).await?;
        let txs = self.source.relevant_transactions(&block.hash).await?;
        self.ingestor.process_block(&block, &txs).await
    }
}
