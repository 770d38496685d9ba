//! The long-lived service object shared by the scheduler and the HTTP layer.
//!
//! [`ChainMonitor`] owns the node handle and the snapshot cache. Workers get
//! it behind an `Arc`; nothing in the crate reaches the node or the snapshot
//! through globals.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    aggregator::{AggregationResult, Threshold, TransactionAggregator},
    monitoring::snapshot_cache::{SnapshotCache, WindowStats},
    node::{NodeError, NodeRpc},
    scanner::{BlockRangeScanner, BlockWindow},
};

/// Outcome of scanning and aggregating one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSummary {
    /// `None` when the height query failed and nothing was scanned.
    pub window: Option<WindowStats>,
    pub aggregation: AggregationResult,
}

impl WindowSummary {
    fn empty() -> Self {
        Self {
            window: None,
            aggregation: AggregationResult::default(),
        }
    }

    pub fn height(&self) -> Option<u64> {
        self.window.map(|w| w.tip)
    }
}

pub struct ChainMonitor {
    node: Arc<dyn NodeRpc>,
    snapshot: SnapshotCache,
    window_size: u64,
    // Serializes on-demand summaries so their RPC waves never overlap.
    on_demand: Mutex<()>,
}

#[cfg_attr(not(test), hotpath::measure_all)]
impl ChainMonitor {
    pub fn new(node: Arc<dyn NodeRpc>, window_size: u64, snapshot: SnapshotCache) -> Self {
        Self {
            node,
            snapshot,
            window_size,
            on_demand: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> &SnapshotCache {
        &self.snapshot
    }

    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    /// Current chain height, straight from the node.
    pub async fn chain_status(&self) -> Result<u64, NodeError> {
        self.node.current_height().await
    }

    /// Reads the tip and opens the window ending at it.
    pub async fn open_window(&self) -> Result<BlockWindow<'_>, NodeError> {
        BlockRangeScanner::new(self.node.as_ref(), self.window_size)
            .scan()
            .await
    }

    /// Drains `window` into an aggregation at `threshold`.
    pub async fn aggregate_window(
        &self,
        mut window: BlockWindow<'_>,
        threshold: Threshold,
    ) -> WindowSummary {
        let mut aggregator = TransactionAggregator::new(threshold);
        while let Some(scanned) = window.next_block().await {
            aggregator.add_block(&scanned.block);
        }

        let stats = WindowStats {
            tip: window.tip(),
            planned: window.planned(),
            scanned: window.fetched(),
        };
        if stats.is_partial() {
            warn!(
                "Partial window at tip {}: {}/{} blocks aggregated",
                stats.tip, stats.scanned, stats.planned
            );
        }

        WindowSummary {
            window: Some(stats),
            aggregation: aggregator.finish(),
        }
    }

    /// Scan and aggregate without taking the on-demand lock.
    ///
    /// A failed height query yields an empty window and a zero aggregation.
    pub async fn scan_window(&self, threshold: Threshold) -> WindowSummary {
        match self.open_window().await {
            Ok(window) => self.aggregate_window(window, threshold).await,
            Err(e) => {
                warn!("Error getting block count: {}", e);
                WindowSummary::empty()
            }
        }
    }

    /// Fresh summary at a caller-supplied threshold. Bypasses the snapshot.
    pub async fn transactions_summary(&self, threshold: Threshold) -> WindowSummary {
        let _guard = self.on_demand.lock().await;
        debug!(threshold = threshold.as_btc(), "On-demand transaction summary");
        self.scan_window(threshold).await
    }
}
