//! Node capability consumed by the monitor.
//!
//! Everything the monitor knows about the chain comes through [`NodeRpc`]: the
//! current height, the hash at a height and the block behind a hash. The
//! production implementation talks JSON-RPC to Bitcoin Core
//! ([`rpc::BitcoinRpcClient`]); tests substitute their own implementation.

use async_trait::async_trait;
use bitcoin::{Block, BlockHash};
use thiserror::Error;

pub mod connector;
pub mod rpc;

pub use connector::{NodeConnector, RetryPolicy};
pub use rpc::{BitcoinRpcClient, RpcCredentials};

/// Failure of a single call against the node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The HTTP round trip failed (connection refused, timeout, bad status).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node answered, but the payload could not be decoded.
    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    /// The response was well-formed JSON but not what the method promises.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Read-only view of a full node.
///
/// Implementations must tolerate concurrent callers: the refresh scheduler
/// and on-demand queries share one handle.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Height of the node's best chain tip.
    async fn current_height(&self) -> Result<u64, NodeError>;

    /// Hash of the block at `height` on the best chain.
    async fn block_hash_at(&self, height: u64) -> Result<BlockHash, NodeError>;

    /// Full block identified by `hash`.
    async fn block_by_hash(&self, hash: &BlockHash) -> Result<Block, NodeError>;
}
