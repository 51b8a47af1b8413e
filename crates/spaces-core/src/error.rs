//! Error types for the spaces ingestion pipeline.

use thiserror::Error;

/// Errors that can occur during a sync pass.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// A collaborator (node or protocol service) was unreachable or returned
    /// malformed data.
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// A transfer-style output referenced a space that has never been seen.
    #[error("Unknown space '{name}' referenced by transfer in tx {txid}")]
    UnknownSpace { name: String, txid: String },

    #[error("Invalid protocol payload in tx {txid}: {reason}")]
    InvalidPayload { txid: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` for errors caused by protocol data that contradicts the
    /// lifecycle rules. These always abort the block being ingested.
    pub fn is_consistency(&self) -> bool {
        matches!(self, Self::UnknownSpace { .. } | Self::InvalidPayload { .. })
    }

    /// Returns `true` if the error came from a fetch collaborator.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(format!("json: {e}"))
    }
}
