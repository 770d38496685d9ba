//! ## Node Monitor
//!
//! Watches a Bitcoin node and exposes what it sees over HTTP.
//!
//! A [`RefreshScheduler`](scheduler::RefreshScheduler) scans the most recent
//! blocks once per interval and publishes the result into a shared snapshot,
//! which `/metrics` and `/summary` serve without touching the node. The
//! `/chainStatus` and `/getTransactionsSummary` queries go to the node on
//! every call.
use std::{future::Future, sync::Arc};

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    config::NodeMonitorConfig,
    error::NodeMonitorError,
    monitor::ChainMonitor,
    monitoring::{MonitoringServer, SnapshotCache},
    node::{NodeConnector, NodeRpc},
    scheduler::RefreshScheduler,
};

pub mod aggregator;
pub mod config;
pub mod error;
pub mod monitor;
pub mod monitoring;
pub mod node;
pub mod scanner;
pub mod scheduler;

/// Capacity of the shutdown broadcast channel.
pub const SHUTDOWN_BROADCAST_CAPACITY: usize = 16;

/// Broadcast to every long-running task when the monitor stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMessage {
    ShutdownAll,
}

/// Represents the node monitor process.
#[derive(Clone)]
pub struct NodeMonitor {
    config: NodeMonitorConfig,
    notify_shutdown: broadcast::Sender<ShutdownMessage>,
}

#[cfg_attr(not(test), hotpath::measure_all)]
impl NodeMonitor {
    /// Creates a new [`NodeMonitor`] instance.
    pub fn new(config: NodeMonitorConfig) -> Self {
        let (notify_shutdown, _) = broadcast::channel(SHUTDOWN_BROADCAST_CAPACITY);
        Self {
            config,
            notify_shutdown,
        }
    }

    /// Connects to the node and serves until shutdown.
    ///
    /// Failing to reach the node within the retry budget is fatal.
    pub async fn start(&self) -> Result<(), NodeMonitorError> {
        let node = self.config.node();
        info!("Node monitor starting, Bitcoin node at {}", node.url());

        let connector = NodeConnector::new(
            node.url(),
            node.credentials(),
            node.rpc_timeout(),
            node.retry_policy(),
        );
        let node = connector.connect().await?;

        self.serve(node).await
    }

    /// Runs the refresh scheduler and the HTTP server against `node` until
    /// Ctrl+C or [`shutdown`](Self::shutdown).
    pub async fn serve(&self, node: Arc<dyn NodeRpc>) -> Result<(), NodeMonitorError> {
        let mut shutdown_requested = self.notify_shutdown.subscribe();

        let monitor = Arc::new(ChainMonitor::new(
            node,
            self.config.window_size(),
            SnapshotCache::new(self.config.refresh_interval()),
        ));

        let server = MonitoringServer::new(*self.config.listen_address(), monitor.clone())?;
        let scheduler = RefreshScheduler::new(monitor, self.config.refresh_interval());

        let scheduler_handle =
            tokio::spawn(scheduler.run(shutdown_signal(&self.notify_shutdown)));
        let mut server_handle = tokio::spawn(server.run(shutdown_signal(&self.notify_shutdown)));

        let server_exited = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, initiating graceful shutdown...");
                None
            }
            _ = shutdown_requested.recv() => {
                info!("Shutdown requested, stopping...");
                None
            }
            joined = &mut server_handle => {
                warn!("Monitoring server exited, shutting down");
                Some(joined)
            }
        };

        let _ = self.notify_shutdown.send(ShutdownMessage::ShutdownAll);

        let joined = match server_exited {
            Some(joined) => joined,
            None => server_handle.await,
        };
        if let Err(e) = scheduler_handle.await {
            error!("Refresh scheduler task failed: {}", e);
        }

        info!("Node monitor stopped");
        match joined {
            Ok(result) => result,
            Err(e) => Err(NodeMonitorError::Server(std::io::Error::other(e))),
        }
    }

    /// Asks a running [`serve`](Self::serve) to stop.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(ShutdownMessage::ShutdownAll);
    }
}

/// Resolves once `ShutdownAll` is broadcast or the sender is gone.
fn shutdown_signal(
    notify_shutdown: &broadcast::Sender<ShutdownMessage>,
) -> impl Future<Output = ()> + Send + 'static {
    let mut receiver = notify_shutdown.subscribe();
    async move {
        let _ = receiver.recv().await;
    }
}
