//! Shared types for the ingestion pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IndexerError;

// ─── Block ────────────────────────────────────────────────────────────────────

/// A block header as reported by the node's `getblock` (verbosity 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    pub height: u64,
    /// Block timestamp (seconds since epoch).
    pub time: i64,
    #[serde(rename = "mediantime", default)]
    pub median_time: i64,
    pub difficulty: f64,
    #[serde(rename = "merkleroot")]
    pub merkle_root: String,
    pub size: u64,
    #[serde(rename = "strippedsize", default)]
    pub stripped_size: u64,
    pub weight: u64,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub bits: String,
    #[serde(default)]
    pub nonce: u64,
    #[serde(rename = "nTx", default)]
    pub tx_count: u32,
    #[serde(rename = "previousblockhash", default)]
    pub previous_hash: Option<String>,
    /// Absent for the current tip.
    #[serde(rename = "nextblockhash", default)]
    pub next_hash: Option<String>,
}

// ─── Covenants ────────────────────────────────────────────────────────────────

/// The protocol operation a covenant describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CovenantKind {
    Bid,
    Transfer,
    Other(String),
}

impl CovenantKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "bid" => Self::Bid,
            "transfer" => Self::Transfer,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Bid => "bid",
            Self::Transfer => "transfer",
            Self::Other(s) => s,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CovenantFields {
    #[serde(rename = "type")]
    kind: Option<String>,
    total_burned: Option<Value>,
}

// ─── Protocol outputs ─────────────────────────────────────────────────────────

/// A transaction output that moves ownership of an existing space.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutput {
    /// Output index within the transaction.
    pub n: u32,
    /// Name of the space the output carries.
    pub name: String,
    pub covenant: Option<CovenantKind>,
    /// The output exactly as the protocol service reported it.
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
struct VoutFields {
    #[serde(default)]
    n: u32,
    space: Option<SpaceRefFields>,
}

#[derive(Debug, Deserialize)]
struct SpaceRefFields {
    name: String,
    #[serde(default)]
    covenant: Option<CovenantFields>,
}

/// An auxiliary protocol event targeting a space by name.
///
/// The typed fields are the only ones the lifecycle rules look at; everything
/// else stays in `raw` for audit.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaOutput {
    pub name: String,
    pub covenant: Option<CovenantKind>,
    /// Present whenever the event carries a non-null `bid_value`, whatever
    /// its JSON type.
    pub bid_value: Option<Value>,
    /// `None` when absent or not an unsigned integer.
    pub total_burned: Option<u64>,
    pub action: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
struct MetaFields {
    action: Option<String>,
    bid_value: Option<Value>,
    #[serde(default)]
    target: Option<TargetFields>,
}

#[derive(Debug, Deserialize)]
struct TargetFields {
    name: Option<String>,
    #[serde(default)]
    covenant: Option<CovenantFields>,
}

impl MetaOutput {
    /// Build from a `vmetaout` entry. The entry must name its target space.
    pub fn from_json(txid: &str, raw: Value) -> Result<Self, IndexerError> {
        let fields: MetaFields =
            serde_json::from_value(raw.clone()).map_err(|e| IndexerError::InvalidPayload {
                txid: txid.to_string(),
                reason: e.to_string(),
            })?;

        let target = fields.target.ok_or_else(|| IndexerError::InvalidPayload {
            txid: txid.to_string(),
            reason: "metadata output has no target".into(),
        })?;
        let name = target.name.ok_or_else(|| IndexerError::InvalidPayload {
            txid: txid.to_string(),
            reason: "metadata target has no name".into(),
        })?;
        let covenant = target.covenant.unwrap_or_default();

        Ok(Self {
            name,
            covenant: covenant.kind.as_deref().map(CovenantKind::parse),
            bid_value: fields.bid_value,
            total_burned: covenant.total_burned.as_ref().and_then(Value::as_u64),
            action: fields.action,
            raw,
        })
    }
}

// ─── Transaction ──────────────────────────────────────────────────────────────

/// A protocol-relevant transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub txid: String,
    /// Transfer-style outputs, in output order.
    pub outputs: Vec<TransferOutput>,
    /// Metadata-style outputs, in the order the protocol reported them.
    pub metadata: Vec<MetaOutput>,
    /// Full decoded payload, stored for audit and replay.
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
struct TxFields {
    txid: String,
    #[serde(default)]
    vout: Vec<Value>,
    #[serde(default)]
    vmetaout: Vec<Value>,
}

impl Transaction {
    /// Parse a transaction from the protocol service's JSON form.
    ///
    /// Outputs without a `space` object are not protocol-relevant and are
    /// skipped; they remain visible in `raw`.
    pub fn from_json(raw: Value) -> Result<Self, IndexerError> {
        let fields: TxFields =
            serde_json::from_value(raw.clone()).map_err(|e| IndexerError::InvalidPayload {
                txid: raw["txid"].as_str().unwrap_or("<unknown>").to_string(),
                reason: e.to_string(),
            })?;

        let mut outputs = Vec::new();
        for vout in fields.vout {
            let parsed: VoutFields =
                serde_json::from_value(vout.clone()).map_err(|e| IndexerError::InvalidPayload {
                    txid: fields.txid.clone(),
                    reason: e.to_string(),
                })?;
            if let Some(space) = parsed.space {
                outputs.push(TransferOutput {
                    n: parsed.n,
                    name: space.name,
                    covenant: space
                        .covenant
                        .and_then(|c| c.kind)
                        .as_deref()
                        .map(CovenantKind::parse),
                    raw: vout,
                });
            }
        }

        let metadata = fields
            .vmetaout
            .into_iter()
            .map(|m| MetaOutput::from_json(&fields.txid, m))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            txid: fields.txid,
            outputs,
            metadata,
            raw,
        })
    }

    /// Returns `true` if the transaction carries any protocol output.
    pub fn is_relevant(&self) -> bool {
        !self.outputs.is_empty() || !self.metadata.is_empty()
    }
}

// ─── Spaces ───────────────────────────────────────────────────────────────────

/// Lifecycle status of a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpaceStatus {
    PreAuction,
    Auction,
    Registered,
    Revoked,
}

impl SpaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreAuction => "pre-auction",
            Self::Auction => "auction",
            Self::Registered => "registered",
            Self::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for SpaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SpaceStatus {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre-auction" => Ok(Self::PreAuction),
            "auction" => Ok(Self::Auction),
            "registered" => Ok(Self::Registered),
            "revoked" => Ok(Self::Revoked),
            other => Err(IndexerError::Storage(format!("unknown space status '{other}'"))),
        }
    }
}

/// The lifecycle action recorded for a history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceAction {
    Transfer,
    Rollout,
    Register,
    Bid,
    Revoke,
    /// A protocol label with no dedicated rule.
    Other(String),
}

impl SpaceAction {
    pub fn from_label(label: &str) -> Self {
        match label {
            "transfer" => Self::Transfer,
            "rollout" => Self::Rollout,
            "register" => Self::Register,
            "bid" => Self::Bid,
            "revoke" => Self::Revoke,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Transfer => "transfer",
            Self::Rollout => "rollout",
            Self::Register => "register",
            Self::Bid => "bid",
            Self::Revoke => "revoke",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for SpaceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named resource tracked by the protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct Space {
    pub id: i64,
    pub name: String,
    /// Cached result of replaying the space's history.
    pub status: SpaceStatus,
    pub last_history_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One append-only ledger entry for a space.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceHistory {
    /// Insertion order; history is always read ascending by id.
    pub id: i64,
    pub space_id: i64,
    pub transaction_id: i64,
    pub txid: String,
    pub action: Option<SpaceAction>,
    pub bid_amount: Option<u64>,
    pub payload: Value,
    pub created_at: i64,
}

/// A history row about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistory {
    pub space_id: i64,
    pub transaction_id: i64,
    pub txid: String,
    pub action: Option<SpaceAction>,
    pub bid_amount: Option<u64>,
    pub payload: Value,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
