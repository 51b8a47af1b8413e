//! spaces-storage: storage backends for the spaces indexer.
//!
//! Every backend implements the ingestion, read, checkpoint and lock
//! contracts from `spaces-core`.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, no persistence)
//! - `sqlite`: SQLite via `sqlx` (embedded, single-file persistence)
//! - `postgres`: PostgreSQL via `sqlx` (advisory-lock run exclusion)

pub mod memory;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod column;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStorage;
