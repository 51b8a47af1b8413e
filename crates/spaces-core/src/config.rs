//! Sync configuration and its fluent builder.
//!
//! ```rust
//! use spaces_core::config::SyncConfigBuilder;
//!
//! let config = SyncConfigBuilder::new()
//!     .lock_name("spaces-sync-testnet")
//!     .activation_height(50_000)
//!     .max_blocks_per_run(1_000)
//!     .build();
//! assert_eq!(config.activation_height, 50_000);
//! ```

use serde::{Deserialize, Serialize};

/// Mainnet height at which the protocol activated.
pub const MAINNET_ACTIVATION_HEIGHT: u64 = 871_222;

/// Default name of the advisory lock serialising sync runs.
pub const DEFAULT_LOCK_NAME: &str = "spaces-sync";

/// Configuration for a [`SyncDriver`](crate::sync::SyncDriver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Advisory lock name; every instance sharing a store must agree on it.
    pub lock_name: String,
    /// First height to index when no checkpoint exists.
    pub activation_height: u64,
    /// Optional cap on heights processed in one run. `None` = up to the tip.
    pub max_blocks_per_run: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lock_name: DEFAULT_LOCK_NAME.into(),
            activation_height: MAINNET_ACTIVATION_HEIGHT,
            max_blocks_per_run: None,
        }
    }
}

/// Fluent builder for `SyncConfig`.
#[derive(Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_name(mut self, name: impl Into<String>) -> Self {
        self.config.lock_name = name.into();
        self
    }

    pub fn activation_height(mut self, height: u64) -> Self {
        self.config.activation_height = height;
        self
    }

    pub fn max_blocks_per_run(mut self, n: u64) -> Self {
        self.config.max_blocks_per_run = Some(n);
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}
