//! In-memory storage backend.
//!
//! Keeps blocks, transactions, spaces, history and checkpoints in RAM.
//! An ingestion transaction holds the table lock for its whole lifetime and
//! works on a private copy of the tables; commit swaps the copy in, drop
//! throws it away. Uniqueness rules match the SQL backends.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use spaces_core::checkpoint::{CheckpointStore, SyncCheckpoint};
use spaces_core::error::IndexerError;
use spaces_core::lock::RunLock;
use spaces_core::store::{IngestTx, SpaceReader, SpaceStore};
use spaces_core::types::{Block, NewHistory, Space, SpaceHistory, SpaceStatus, Transaction};

/// A stored transaction row.
#[derive(Debug, Clone)]
pub struct TransactionRow {
    pub id: i64,
    pub block_id: i64,
    pub position: u32,
    pub txid: String,
    pub raw: Value,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    blocks: Vec<(i64, Block)>,
    transactions: Vec<TransactionRow>,
    spaces: Vec<Space>,
    history: Vec<SpaceHistory>,
}

impl Tables {
    fn space_by_name(&self, name: &str) -> Option<&Space> {
        self.spaces.iter().find(|s| s.name == name)
    }

    fn history_of(&self, space_id: i64) -> Vec<SpaceHistory> {
        self.history
            .iter()
            .filter(|h| h.space_id == space_id)
            .cloned()
            .collect()
    }
}

/// In-memory indexer storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: AsyncMutex<Tables>,
    checkpoints: Mutex<Vec<SyncCheckpoint>>,
    locks: Mutex<HashSet<String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored block at `height`, if it had protocol activity.
    pub async fn block_at(&self, height: u64) -> Option<Block> {
        self.tables
            .lock()
            .await
            .blocks
            .iter()
            .find(|(_, b)| b.height == height)
            .map(|(_, b)| b.clone())
    }

    /// Heights of every stored block, ascending.
    pub async fn stored_heights(&self) -> Vec<u64> {
        let mut heights: Vec<u64> = self
            .tables
            .lock()
            .await
            .blocks
            .iter()
            .map(|(_, b)| b.height)
            .collect();
        heights.sort_unstable();
        heights
    }

    /// Transaction rows belonging to a stored block.
    pub async fn transactions_in(&self, block_id: i64) -> Vec<TransactionRow> {
        self.tables
            .lock()
            .await
            .transactions
            .iter()
            .filter(|t| t.block_id == block_id)
            .cloned()
            .collect()
    }

    /// Total number of history rows across all spaces.
    pub async fn history_count(&self) -> usize {
        self.tables.lock().await.history.len()
    }
}

// ─── Ingestion transaction ───────────────────────────────────────────────────

struct MemoryTx<'a> {
    guard: MutexGuard<'a, Tables>,
    work: Tables,
}

fn unique_violation(what: &str, value: impl std::fmt::Display) -> IndexerError {
    IndexerError::Storage(format!("unique constraint violated: {what} '{value}' already exists"))
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl IngestTx for MemoryTx<'_> {
    async fn insert_block(&mut self, block: &Block) -> Result<i64, IndexerError> {
        if self.work.blocks.iter().any(|(_, b)| b.hash == block.hash) {
            return Err(unique_violation("block hash", &block.hash));
        }
        if self.work.blocks.iter().any(|(_, b)| b.height == block.height) {
            return Err(unique_violation("block height", block.height));
        }
        let id = self.work.blocks.len() as i64 + 1;
        self.work.blocks.push((id, block.clone()));
        Ok(id)
    }

    async fn insert_transaction(
        &mut self,
        block_id: i64,
        position: u32,
        tx: &Transaction,
    ) -> Result<i64, IndexerError> {
        if self.work.transactions.iter().any(|t| t.txid == tx.txid) {
            return Err(unique_violation("txid", &tx.txid));
        }
        let id = self.work.transactions.len() as i64 + 1;
        self.work.transactions.push(TransactionRow {
            id,
            block_id,
            position,
            txid: tx.txid.clone(),
            raw: tx.raw.clone(),
        });
        Ok(id)
    }

    async fn find_space(&mut self, name: &str) -> Result<Option<Space>, IndexerError> {
        Ok(self.work.space_by_name(name).cloned())
    }

    async fn create_space(
        &mut self,
        name: &str,
        status: SpaceStatus,
    ) -> Result<Space, IndexerError> {
        if self.work.space_by_name(name).is_some() {
            return Err(unique_violation("space", name));
        }
        let ts = now();
        let space = Space {
            id: self.work.spaces.len() as i64 + 1,
            name: name.to_string(),
            status,
            last_history_id: None,
            created_at: ts,
            updated_at: ts,
        };
        self.work.spaces.push(space.clone());
        Ok(space)
    }

    async fn space_history(&mut self, space_id: i64) -> Result<Vec<SpaceHistory>, IndexerError> {
        Ok(self.work.history_of(space_id))
    }

    async fn append_history(&mut self, entry: &NewHistory) -> Result<i64, IndexerError> {
        if !self.work.spaces.iter().any(|s| s.id == entry.space_id) {
            return Err(IndexerError::Storage(format!(
                "foreign key violated: space {} does not exist",
                entry.space_id
            )));
        }
        if !self.work.transactions.iter().any(|t| t.id == entry.transaction_id) {
            return Err(IndexerError::Storage(format!(
                "foreign key violated: transaction {} does not exist",
                entry.transaction_id
            )));
        }
        let id = self.work.history.len() as i64 + 1;
        self.work.history.push(SpaceHistory {
            id,
            space_id: entry.space_id,
            transaction_id: entry.transaction_id,
            txid: entry.txid.clone(),
            action: entry.action.clone(),
            bid_amount: entry.bid_amount,
            payload: entry.payload.clone(),
            created_at: now(),
        });
        Ok(id)
    }

    async fn update_space(
        &mut self,
        space_id: i64,
        last_history_id: i64,
        status: Option<SpaceStatus>,
    ) -> Result<(), IndexerError> {
        let space = self
            .work
            .spaces
            .iter_mut()
            .find(|s| s.id == space_id)
            .ok_or_else(|| IndexerError::Storage(format!("space {space_id} does not exist")))?;
        space.last_history_id = Some(last_history_id);
        if let Some(status) = status {
            space.status = status;
        }
        space.updated_at = now();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), IndexerError> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

#[async_trait]
impl SpaceStore for InMemoryStorage {
    async fn begin<'a>(&'a self) -> Result<Box<dyn IngestTx + 'a>, IndexerError> {
        let guard = self.tables.lock().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }
}

#[async_trait]
impl SpaceReader for InMemoryStorage {
    async fn space(&self, name: &str) -> Result<Option<Space>, IndexerError> {
        Ok(self.tables.lock().await.space_by_name(name).cloned())
    }

    async fn history_for(&self, name: &str) -> Result<Vec<SpaceHistory>, IndexerError> {
        let tables = self.tables.lock().await;
        Ok(match tables.space_by_name(name) {
            Some(space) => tables.history_of(space.id),
            None => Vec::new(),
        })
    }

    async fn block_count(&self) -> Result<u64, IndexerError> {
        Ok(self.tables.lock().await.blocks.len() as u64)
    }

    async fn transaction_count(&self) -> Result<u64, IndexerError> {
        Ok(self.tables.lock().await.transactions.len() as u64)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn last_end_height(&self) -> Result<Option<u64>, IndexerError> {
        Ok(self.checkpoints.lock().unwrap().iter().map(|c| c.end_height).max())
    }

    async fn record(&self, checkpoint: SyncCheckpoint) -> Result<(), IndexerError> {
        self.checkpoints.lock().unwrap().push(checkpoint);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SyncCheckpoint>, IndexerError> {
        Ok(self.checkpoints.lock().unwrap().clone())
    }
}

#[async_trait]
impl RunLock for InMemoryStorage {
    async fn try_lock(&self, name: &str) -> Result<bool, IndexerError> {
        Ok(self.locks.lock().unwrap().insert(name.to_string()))
    }

    async fn unlock(&self, name: &str) -> Result<(), IndexerError> {
        self.locks.lock().unwrap().remove(name);
        Ok(())
    }
}
