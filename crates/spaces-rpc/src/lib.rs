//! spaces-rpc: JSON-RPC fetchers for the spaces indexer.
//!
//! [`RpcBlockSource`] implements `spaces_core::BlockSource` over two
//! endpoints: a Bitcoin node for block headers and the spaces protocol
//! service for per-block protocol metadata. Transient HTTP failures are
//! retried with exponential backoff.

pub mod client;
pub mod error;
pub mod request;
pub mod retry;
pub mod source;

#[cfg(test)]
mod testing;

pub use client::{RpcClient, RpcClientConfig};
pub use error::RpcError;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use retry::{RetryConfig, RetryPolicy};
pub use source::{RpcBlockSource, RpcSourceConfig};
