//! Named advisory lock shared by every instance using the same store.

use async_trait::async_trait;

use crate::error::IndexerError;

/// A cooperative, store-mediated mutex keyed by name.
///
/// Acquisition never blocks: `try_lock` reports whether this caller now holds
/// the lock. Holding is scoped to the process that acquired it, so a second
/// process (or a second driver in the same process) sees it as taken.
#[async_trait]
pub trait RunLock: Send + Sync {
    async fn try_lock(&self, name: &str) -> Result<bool, IndexerError>;

    /// Release a lock previously acquired by this caller. Releasing a lock
    /// that is not held is a no-op.
    async fn unlock(&self, name: &str) -> Result<(), IndexerError>;
}
