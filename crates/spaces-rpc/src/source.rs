//! `BlockSource` over a Bitcoin node and the spaces protocol service.
//!
//! ```text
//! tip_height             → node:   getblockcount
//! block_at(h)            → node:   getblockhash h, getblock <hash> 1
//! relevant_transactions  → spaces: getblockmeta <hash> → tx_meta[]
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use spaces_core::error::IndexerError;
use spaces_core::source::BlockSource;
use spaces_core::types::{Block, Transaction};

use crate::client::{RpcClient, RpcClientConfig};
use crate::error::RpcError;
use crate::retry::RetryConfig;

/// Endpoints and client settings for [`RpcBlockSource`].
#[derive(Debug, Clone)]
pub struct RpcSourceConfig {
    pub bitcoin_url: String,
    pub spaces_url: String,
    /// Basic-auth credentials for the Bitcoin node.
    pub bitcoin_auth: Option<(String, String)>,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl RpcSourceConfig {
    pub fn new(bitcoin_url: impl Into<String>, spaces_url: impl Into<String>) -> Self {
        Self {
            bitcoin_url: bitcoin_url.into(),
            spaces_url: spaces_url.into(),
            bitcoin_auth: None,
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_bitcoin_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.bitcoin_auth = Some((user.into(), password.into()));
        self
    }
}

/// Fetches blocks from the node and protocol transactions from the spaces
/// service.
pub struct RpcBlockSource {
    node: RpcClient,
    spaces: RpcClient,
}

impl RpcBlockSource {
    pub fn new(config: RpcSourceConfig) -> Result<Self, RpcError> {
        let node = RpcClient::new(
            config.bitcoin_url,
            RpcClientConfig {
                retry: config.retry.clone(),
                request_timeout: config.request_timeout,
                auth: config.bitcoin_auth,
            },
        )?;
        let spaces = RpcClient::new(
            config.spaces_url,
            RpcClientConfig {
                retry: config.retry,
                request_timeout: config.request_timeout,
                auth: None,
            },
        )?;
        Ok(Self { node, spaces })
    }
}

/// Extract protocol transactions from a `getblockmeta` result.
///
/// A `null` result means the service has no protocol data for the block.
fn parse_block_meta(block_hash: &str, meta: Value) -> Result<Vec<Transaction>, IndexerError> {
    let entries = match meta {
        Value::Null => return Ok(Vec::new()),
        Value::Object(mut obj) => obj.remove("tx_meta").unwrap_or(Value::Null),
        other => {
            return Err(IndexerError::Fetch(format!(
                "getblockmeta {block_hash}: expected an object, got {other}"
            )))
        }
    };

    let entries = match entries {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => {
            return Err(IndexerError::Fetch(format!(
                "getblockmeta {block_hash}: tx_meta is not an array: {other}"
            )))
        }
    };

    let mut txs = Vec::with_capacity(entries.len());
    for entry in entries {
        let tx = Transaction::from_json(entry)?;
        if tx.is_relevant() {
            txs.push(tx);
        }
    }
    Ok(txs)
}

#[async_trait]
impl BlockSource for RpcBlockSource {
    async fn tip_height(&self) -> Result<u64, IndexerError> {
        Ok(self.node.call("getblockcount", vec![]).await?)
    }

    async fn block_at(&self, height: u64) -> Result<Block, IndexerError> {
        let hash: String = self.node.call("getblockhash", vec![json!(height)]).await?;
        let block: Block = self.node.call("getblock", vec![json!(hash), json!(1)]).await?;
        if block.height != height {
            return Err(IndexerError::Fetch(format!(
                "getblock {hash} reported height {}, expected {height}",
                block.height
            )));
        }
        Ok(block)
    }

    async fn relevant_transactions(
        &self,
        block_hash: &str,
    ) -> Result<Vec<Transaction>, IndexerError> {
        let meta = self
            .spaces
            .call_raw("getblockmeta", vec![json!(block_hash)])
            .await?;
        let txs = parse_block_meta(block_hash, meta)?;
        debug!(block = block_hash, relevant = txs.len(), "block metadata fetched");
        Ok(txs)
    }
}
