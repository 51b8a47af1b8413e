//! The block source contract consumed by the sync driver.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::types::{Block, Transaction};

/// Read-only access to blocks and their protocol-relevant transactions.
///
/// Implementations wrap the node and protocol-service clients; errors are
/// reported as [`IndexerError::Fetch`] and stop the current run.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Height of the current chain tip.
    async fn tip_height(&self) -> Result<u64, IndexerError>;

    /// The block header at `height`.
    async fn block_at(&self, height: u64) -> Result<Block, IndexerError>;

    /// Transactions in the block that carry protocol data (may be empty).
    async fn relevant_transactions(&self, block_hash: &str)
        -> Result<Vec<Transaction>, IndexerError>;
}

#[async_trait]
impl<T: BlockSource + ?Sized> BlockSource for Arc<T> {
    async fn tip_height(&self) -> Result<u64, IndexerError> {
        (**self).tip_height().await
    }

    async fn block_at(&self, height: u64) -> Result<Block, IndexerError> {
        (**self).block_at(height).await
    }

    async fn relevant_transactions(
        &self,
        block_hash: &str,
    ) -> Result<Vec<Transaction>, IndexerError> {
        (**self).relevant_transactions(block_hash).await
    }
}
