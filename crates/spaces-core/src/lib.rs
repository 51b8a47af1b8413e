//! spaces-core: decoder, transactional ingestion and sync driver for the
//! spaces name/auction protocol.
//!
//! # Architecture
//!
//! ```text
//! SyncDriver ── RunLock            (one run at a time across processes)
//!      ├──────── CheckpointManager (resume height, run records)
//!      ├──────── BlockSource       (node + protocol service, read-only)
//!      └──────── Ingestor ── SpaceStore / IngestTx (one atomic unit per block)
//!                    └────── decoder (pure lifecycle rules)
//! ```

pub mod checkpoint;
pub mod config;
pub mod decoder;
pub mod error;
pub mod ingest;
pub mod lock;
pub mod source;
pub mod store;
pub mod sync;
pub mod types;

pub use checkpoint::{CheckpointManager, CheckpointStore, SyncCheckpoint};
pub use config::{SyncConfig, SyncConfigBuilder};
pub use decoder::Decision;
pub use error::IndexerError;
pub use ingest::{BlockReceipt, Ingestor};
pub use lock::RunLock;
pub use source::BlockSource;
pub use store::{IngestTx, SpaceReader, SpaceStore};
pub use sync::{RunSummary, SyncDriver, SyncOutcome};
pub use types::{
    Block, CovenantKind, MetaOutput, NewHistory, Space, SpaceAction, SpaceHistory, SpaceStatus,
    Transaction, TransferOutput,
};
