//! Bounded-retry connection to the node.

use std::{sync::Arc, time::Duration};

use tracing::{error, info};

use super::{BitcoinRpcClient, NodeError, NodeRpc, RpcCredentials};
use crate::error::ConnectionError;

/// How many times to try the node, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

/// Establishes the node handle used for the lifetime of the process.
pub struct NodeConnector {
    url: String,
    credentials: RpcCredentials,
    rpc_timeout: Duration,
    retry: RetryPolicy,
}

impl NodeConnector {
    pub fn new(
        url: impl Into<String>,
        credentials: RpcCredentials,
        rpc_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            url: url.into(),
            credentials,
            rpc_timeout,
            retry,
        }
    }

    /// Builds the RPC client and probes it with a height query.
    ///
    /// Fails with [`ConnectionError::RetriesExhausted`] once every attempt in
    /// the retry budget has failed. Whether that is fatal is the caller's call.
    pub async fn connect(&self) -> Result<Arc<dyn NodeRpc>, ConnectionError> {
        let url = self.url.clone();
        let credentials = self.credentials.clone();
        let timeout = self.rpc_timeout;

        connect_with_retry(self.retry, || {
            let url = url.clone();
            let credentials = credentials.clone();
            async move {
                let client = BitcoinRpcClient::new(url, credentials, timeout)?;
                let height = client.current_height().await?;
                Ok((Arc::new(client) as Arc<dyn NodeRpc>, height))
            }
        })
        .await
        .map(|(client, height)| {
            info!(
                "Successfully connected to Bitcoin node at {}. Current block count: {}",
                self.url, height
            );
            client
        })
    }
}

/// Runs `attempt` until it succeeds or the policy's budget is spent,
/// sleeping `policy.delay` between failed attempts.
pub async fn connect_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    mut attempt: F,
) -> Result<T, ConnectionError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, NodeError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for n in 1..=max_attempts {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                error!(
                    "Failed to connect to Bitcoin node (attempt {}/{}): {}",
                    n, max_attempts, e
                );
                last_error = Some(e);
                if n < max_attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    Err(ConnectionError::RetriesExhausted {
        attempts: max_attempts,
        last_error: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string()),
    })
}
