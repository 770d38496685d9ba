//! Bitcoin Core JSON-RPC client.
//!
//! Speaks JSON-RPC 1.0 over HTTP POST with basic auth, which is what
//! `bitcoind` serves on its RPC port. Blocks are fetched raw (`getblock` with
//! verbosity 0) and decoded locally, so output values stay in satoshis.

use std::{str::FromStr, sync::atomic::AtomicU64, sync::atomic::Ordering, time::Duration};

use async_trait::async_trait;
use bitcoin::{consensus, Block, BlockHash};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::trace;

use super::{NodeError, NodeRpc};

/// Credentials for the node's RPC interface.
#[derive(Debug, Clone)]
pub struct RpcCredentials {
    pub user: String,
    pub password: String,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// [`NodeRpc`] backed by a Bitcoin Core node.
pub struct BitcoinRpcClient {
    http: reqwest::Client,
    url: String,
    credentials: RpcCredentials,
    next_id: AtomicU64,
}

impl BitcoinRpcClient {
    /// Builds a client for the node at `url`.
    ///
    /// No request is sent here; use [`super::NodeConnector`] to verify the node
    /// is reachable.
    pub fn new(
        url: impl Into<String>,
        credentials: RpcCredentials,
        timeout: Duration,
    ) -> Result<Self, NodeError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            credentials,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, NodeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!(id, method, "Sending RPC request");

        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.password))
            .json(&RpcRequest {
                jsonrpc: "1.0",
                id,
                method,
                params,
            })
            .send()
            .await?;

        // bitcoind reports RPC errors with a non-2xx status *and* a JSON body,
        // so the body is inspected before the status.
        let status = response.status();
        let body = response.bytes().await?;
        let parsed: RpcResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => {
                return Err(NodeError::Decode {
                    what: "RPC response",
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(NodeError::InvalidResponse(format!(
                    "HTTP {status} from {method}"
                )))
            }
        };

        if let Some(error) = parsed.error {
            return Err(NodeError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_value(parsed.result).map_err(|e| NodeError::Decode {
            what: "RPC result",
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl NodeRpc for BitcoinRpcClient {
    async fn current_height(&self) -> Result<u64, NodeError> {
        self.call("getblockcount", json!([])).await
    }

    async fn block_hash_at(&self, height: u64) -> Result<BlockHash, NodeError> {
        let hash: String = self.call("getblockhash", json!([height])).await?;
        parse_block_hash(&hash)
    }

    async fn block_by_hash(&self, hash: &BlockHash) -> Result<Block, NodeError> {
        let raw: String = self
            .call("getblock", json!([hash.to_string(), 0]))
            .await?;
        decode_block(&raw)
    }
}

fn parse_block_hash(hash: &str) -> Result<BlockHash, NodeError> {
    BlockHash::from_str(hash).map_err(|e| NodeError::Decode {
        what: "block hash",
        reason: e.to_string(),
    })
}

fn decode_block(raw: &str) -> Result<Block, NodeError> {
    let bytes = hex::decode(raw).map_err(|e| NodeError::Decode {
        what: "block hex",
        reason: e.to_string(),
    })?;
    consensus::deserialize(&bytes).map_err(|e| NodeError::Decode {
        what: "block",
        reason: e.to_string(),
    })
}
