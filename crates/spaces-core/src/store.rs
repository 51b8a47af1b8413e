//! Durable store contract for block ingestion.
//!
//! A [`SpaceStore`] hands out [`IngestTx`] handles, each an open atomic unit
//! against the store. Reads through a handle see the handle's own earlier
//! writes. Dropping a handle without calling [`IngestTx::commit`] discards
//! everything written through it.

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::types::{Block, NewHistory, Space, SpaceHistory, SpaceStatus, Transaction};

/// An open store transaction used to ingest one block.
#[async_trait]
pub trait IngestTx: Send {
    /// Insert the block row and return its local id.
    async fn insert_block(&mut self, block: &Block) -> Result<i64, IndexerError>;

    /// Insert a transaction row belonging to `block_id` and return its id.
    async fn insert_transaction(
        &mut self,
        block_id: i64,
        position: u32,
        tx: &Transaction,
    ) -> Result<i64, IndexerError>;

    /// Look up a space by its unique name.
    async fn find_space(&mut self, name: &str) -> Result<Option<Space>, IndexerError>;

    /// Create a new space with the given initial status.
    async fn create_space(&mut self, name: &str, status: SpaceStatus)
        -> Result<Space, IndexerError>;

    /// The space's history, oldest first.
    async fn space_history(&mut self, space_id: i64) -> Result<Vec<SpaceHistory>, IndexerError>;

    /// Append a history row and return its id.
    async fn append_history(&mut self, entry: &NewHistory) -> Result<i64, IndexerError>;

    /// Point the space at its latest history row, moving it to `status` when
    /// one is given.
    async fn update_space(
        &mut self,
        space_id: i64,
        last_history_id: i64,
        status: Option<SpaceStatus>,
    ) -> Result<(), IndexerError>;

    /// Make every write through this handle durable and visible.
    async fn commit(self: Box<Self>) -> Result<(), IndexerError>;
}

/// A store that can open ingestion transactions.
#[async_trait]
pub trait SpaceStore: Send + Sync {
    async fn begin<'a>(&'a self) -> Result<Box<dyn IngestTx + 'a>, IndexerError>;
}

/// Committed-state reads for operator inspection.
#[async_trait]
pub trait SpaceReader: Send + Sync {
    async fn space(&self, name: &str) -> Result<Option<Space>, IndexerError>;

    /// History of the named space, oldest first. Empty for unknown names.
    async fn history_for(&self, name: &str) -> Result<Vec<SpaceHistory>, IndexerError>;

    async fn block_count(&self) -> Result<u64, IndexerError>;

    async fn transaction_count(&self) -> Result<u64, IndexerError>;
}
