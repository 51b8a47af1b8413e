//! Transactional block ingestion.
//!
//! One block is one store transaction: the block row, its transaction rows,
//! and every history append and space update derived from them are committed
//! together or not at all. Blocks without protocol activity are not stored.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::decoder::{self, Decision};
use crate::error::IndexerError;
use crate::store::{IngestTx, SpaceStore};
use crate::types::{Block, MetaOutput, NewHistory, Space, SpaceStatus, Transaction, TransferOutput};

/// Summary of what one committed block wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockReceipt {
    pub block_id: i64,
    pub height: u64,
    pub transactions: usize,
    pub history_rows: usize,
    pub spaces_created: usize,
    /// History rows that moved a space to a new status.
    pub transitions: usize,
}

/// Applies blocks to a [`SpaceStore`].
pub struct Ingestor {
    store: Arc<dyn SpaceStore>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn SpaceStore>) -> Self {
        Self { store }
    }

    /// Ingest `block` with its protocol-relevant transactions.
    ///
    /// Returns `Ok(None)` without touching the store when `txs` is empty.
    /// Outputs are applied in transaction order; within a transaction all
    /// transfer-style outputs come first, then metadata-style outputs.
    pub async fn process_block(
        &self,
        block: &Block,
        txs: &[Transaction],
    ) -> Result<Option<BlockReceipt>, IndexerError> {
        if txs.is_empty() {
            debug!(height = block.height, "no protocol activity, block not stored");
            return Ok(None);
        }

        let mut tx = self.store.begin().await?;
        let block_id = tx.insert_block(block).await?;
        let mut receipt = BlockReceipt {
            block_id,
            height: block.height,
            transactions: txs.len(),
            ..Default::default()
        };

        let mut tx_ids = Vec::with_capacity(txs.len());
        for (position, t) in txs.iter().enumerate() {
            tx_ids.push(tx.insert_transaction(block_id, position as u32, t).await?);
        }

        for (t, &tx_id) in txs.iter().zip(&tx_ids) {
            for output in &t.outputs {
                apply_transfer(tx.as_mut(), t, tx_id, output, &mut receipt).await?;
            }
            for meta in &t.metadata {
                apply_metadata(tx.as_mut(), t, tx_id, meta, &mut receipt).await?;
            }
        }

        tx.commit().await?;
        debug!(
            height = block.height,
            hash = %block.hash,
            txs = receipt.transactions,
            history = receipt.history_rows,
            "block committed"
        );
        Ok(Some(receipt))
    }
}

async fn apply_transfer(
    tx: &mut (dyn IngestTx + '_),
    t: &Transaction,
    tx_id: i64,
    output: &TransferOutput,
    receipt: &mut BlockReceipt,
) -> Result<(), IndexerError> {
    let space = tx
        .find_space(&output.name)
        .await?
        .ok_or_else(|| IndexerError::UnknownSpace {
            name: output.name.clone(),
            txid: t.txid.clone(),
        })?;

    let decision = decoder::classify_transfer(&space);
    append(tx, &space, t, tx_id, decision, &output.raw, receipt).await
}

async fn apply_metadata(
    tx: &mut (dyn IngestTx + '_),
    t: &Transaction,
    tx_id: i64,
    meta: &MetaOutput,
    receipt: &mut BlockReceipt,
) -> Result<(), IndexerError> {
    let space = match tx.find_space(&meta.name).await? {
        Some(space) => space,
        None => {
            receipt.spaces_created += 1;
            tx.create_space(&meta.name, SpaceStatus::PreAuction).await?
        }
    };

    let history = tx.space_history(space.id).await?;
    let decision = decoder::classify_metadata(meta, &history);
    append(tx, &space, t, tx_id, decision, &meta.raw, receipt).await
}

/// Append the history row and refresh the space's cached state with it.
async fn append(
    tx: &mut (dyn IngestTx + '_),
    space: &Space,
    t: &Transaction,
    tx_id: i64,
    decision: Decision,
    payload: &Value,
    receipt: &mut BlockReceipt,
) -> Result<(), IndexerError> {
    let history_id = tx
        .append_history(&NewHistory {
            space_id: space.id,
            transaction_id: tx_id,
            txid: t.txid.clone(),
            action: decision.action.clone(),
            bid_amount: decision.bid_amount,
            payload: payload.clone(),
        })
        .await?;
    tx.update_space(space.id, history_id, decision.new_status).await?;

    receipt.history_rows += 1;
    if decision.new_status.is_some() {
        receipt.transitions += 1;
    }
    debug!(
        space = %space.name,
        txid = %t.txid,
        action = decision.action.as_ref().map(|a| a.as_str()).unwrap_or("-"),
        status = decision.new_status.map(|s| s.as_str()).unwrap_or("unchanged"),
        "history appended"
    );
    Ok(())
}
