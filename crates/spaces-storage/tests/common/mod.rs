//! Fixtures shared by the storage integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use spaces_core::error::IndexerError;
use spaces_core::source::BlockSource;
use spaces_core::store::{IngestTx, SpaceStore};
use spaces_core::types::{Block, NewHistory, Space, SpaceHistory, SpaceStatus, Transaction};

pub fn block(height: u64) -> Block {
    Block {
        hash: format!("{height:064x}"),
        height,
        time: 1_730_000_000 + height as i64,
        median_time: 1_730_000_000,
        difficulty: 1.0,
        merkle_root: "00".into(),
        size: 300,
        stripped_size: 200,
        weight: 900,
        version: 0x2000_0000,
        bits: "17034219".into(),
        nonce: height,
        tx_count: 2,
        previous_hash: height.checked_sub(1).map(|h| format!("{h:064x}")),
        next_hash: None,
    }
}

fn tx_with(txid: &str, vout: Vec<Value>, vmetaout: Vec<Value>) -> Transaction {
    Transaction::from_json(json!({ "txid": txid, "vout": vout, "vmetaout": vmetaout }))
        .expect("fixture transaction parses")
}

/// A metadata event opening the auction for `name`.
pub fn rollout(txid: &str, name: &str, bid_value: u64) -> Transaction {
    tx_with(
        txid,
        vec![],
        vec![json!({
            "action": "rollout",
            "bid_value": bid_value,
            "target": { "name": name, "covenant": { "type": "reserve" } }
        })],
    )
}

/// A metadata event bidding `burned` on `name`.
pub fn bid(txid: &str, name: &str, burned: u64) -> Transaction {
    tx_with(
        txid,
        vec![],
        vec![json!({
            "action": "bid",
            "target": { "name": name, "covenant": { "type": "bid", "total_burned": burned } }
        })],
    )
}

/// A metadata event with a transfer covenant, which registers a space after a bid.
pub fn claim(txid: &str, name: &str) -> Transaction {
    tx_with(
        txid,
        vec![],
        vec![json!({
            "target": { "name": name, "covenant": { "type": "transfer" } }
        })],
    )
}

/// A metadata event carrying only an action label.
pub fn labelled(txid: &str, name: &str, action: &str) -> Transaction {
    tx_with(
        txid,
        vec![],
        vec![json!({ "action": action, "target": { "name": name } })],
    )
}

/// A transaction with a single transfer-style output for `name`.
pub fn transfer(txid: &str, name: &str) -> Transaction {
    tx_with(
        txid,
        vec![
            json!({ "n": 0, "value": 1000 }),
            json!({ "n": 1, "value": 662, "space": { "name": name, "covenant": { "type": "transfer" } } }),
        ],
        vec![],
    )
}

// ─── Scripted block source ───────────────────────────────────────────────────

/// A chain whose protocol activity is scripted per height.
#[derive(Default)]
pub struct ScriptedSource {
    pub tip: u64,
    activity: HashMap<String, Vec<Transaction>>,
    fail_at: Option<u64>,
    delay: Option<Duration>,
    fetched: Mutex<Vec<u64>>,
}

impl ScriptedSource {
    pub fn new(tip: u64) -> Self {
        Self {
            tip,
            ..Default::default()
        }
    }

    pub fn with_activity(mut self, height: u64, txs: Vec<Transaction>) -> Self {
        self.activity.insert(block(height).hash, txs);
        self
    }

    /// Make `block_at(height)` fail.
    pub fn failing_at(mut self, height: u64) -> Self {
        self.fail_at = Some(height);
        self
    }

    /// Slow down `tip_height` so concurrent runs overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every height passed to `block_at`, in call order.
    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlockSource for ScriptedSource {
    async fn tip_height(&self) -> Result<u64, IndexerError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.tip)
    }

    async fn block_at(&self, height: u64) -> Result<Block, IndexerError> {
        self.fetched.lock().unwrap().push(height);
        if self.fail_at == Some(height) {
            return Err(IndexerError::Fetch(format!("node unreachable at {height}")));
        }
        Ok(block(height))
    }

    async fn relevant_transactions(
        &self,
        block_hash: &str,
    ) -> Result<Vec<Transaction>, IndexerError> {
        Ok(self.activity.get(block_hash).cloned().unwrap_or_default())
    }
}

// ─── Failure injection ───────────────────────────────────────────────────────

/// Wraps a store and fails the N-th history append (1-based) across all
/// transactions it opens.
pub struct FailingStore<S> {
    inner: Arc<S>,
    fail_on: usize,
    appends: Arc<AtomicUsize>,
}

impl<S> FailingStore<S> {
    pub fn new(inner: Arc<S>, fail_on: usize) -> Self {
        Self {
            inner,
            fail_on,
            appends: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct FailingTx<'a> {
    inner: Box<dyn IngestTx + 'a>,
    fail_on: usize,
    appends: Arc<AtomicUsize>,
}

#[async_trait]
impl<S: SpaceStore> SpaceStore for FailingStore<S> {
    async fn begin<'a>(&'a self) -> Result<Box<dyn IngestTx + 'a>, IndexerError> {
        Ok(Box::new(FailingTx {
            inner: self.inner.begin().await?,
            fail_on: self.fail_on,
            appends: self.appends.clone(),
        }))
    }
}

#[async_trait]
impl IngestTx for FailingTx<'_> {
    async fn insert_block(&mut self, block: &Block) -> Result<i64, IndexerError> {
        self.inner.insert_block(block).await
    }

    async fn insert_transaction(
        &mut self,
        block_id: i64,
        position: u32,
        tx: &Transaction,
    ) -> Result<i64, IndexerError> {
        self.inner.insert_transaction(block_id, position, tx).await
    }

    async fn find_space(&mut self, name: &str) -> Result<Option<Space>, IndexerError> {
        self.inner.find_space(name).await
    }

    async fn create_space(
        &mut self,
        name: &str,
        status: SpaceStatus,
    ) -> Result<Space, IndexerError> {
        self.inner.create_space(name, status).await
    }

    async fn space_history(&mut self, space_id: i64) -> Result<Vec<SpaceHistory>, IndexerError> {
        self.inner.space_history(space_id).await
    }

    async fn append_history(&mut self, entry: &NewHistory) -> Result<i64, IndexerError> {
        let n = self.appends.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(IndexerError::Storage(format!("injected failure on append #{n}")));
        }
        self.inner.append_history(entry).await
    }

    async fn update_space(
        &mut self,
        space_id: i64,
        last_history_id: i64,
        status: Option<SpaceStatus>,
    ) -> Result<(), IndexerError> {
        self.inner.update_space(space_id, last_history_id, status).await
    }

    async fn commit(self: Box<Self>) -> Result<(), IndexerError> {
        self.inner.commit().await
    }
}
