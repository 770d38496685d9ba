//! Periodic refresh of the metrics snapshot.
//!
//! Each cycle moves through `Idle -> Scanning -> Aggregating -> Publishing`
//! and back to `Idle`. The first cycle starts as soon as the scheduler runs;
//! later cycles start one `interval` after the previous one finished. A cycle
//! that cannot read the chain height still publishes, with status
//! Disconnected and a zero aggregation.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    aggregator::{AggregationResult, Threshold},
    monitor::ChainMonitor,
    monitoring::snapshot_cache::{ConnectionStatus, MetricsSnapshot, SnapshotUpdate},
};

/// Where the scheduler is within its current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    /// Reading the tip height.
    Scanning,
    /// Walking the window and aggregating its blocks.
    Aggregating,
    Publishing,
}

pub struct RefreshScheduler {
    monitor: Arc<ChainMonitor>,
    interval: Duration,
    phase: watch::Sender<CyclePhase>,
}

impl RefreshScheduler {
    pub fn new(monitor: Arc<ChainMonitor>, interval: Duration) -> Self {
        let (phase, _) = watch::channel(CyclePhase::Idle);
        Self {
            monitor,
            interval,
            phase,
        }
    }

    /// Follow the scheduler's phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<CyclePhase> {
        self.phase.subscribe()
    }

    /// Runs one full cycle and returns the snapshot it published.
    pub async fn run_cycle(&self) -> MetricsSnapshot {
        self.phase.send_replace(CyclePhase::Scanning);

        let update = match self.monitor.open_window().await {
            Ok(window) => {
                self.phase.send_replace(CyclePhase::Aggregating);
                let summary = self.monitor.aggregate_window(window, Threshold::ZERO).await;
                SnapshotUpdate {
                    status: ConnectionStatus::Connected,
                    height: summary.height(),
                    aggregation: summary.aggregation,
                    window: summary.window,
                }
            }
            Err(e) => {
                warn!("Error getting block count: {}", e);
                SnapshotUpdate {
                    status: ConnectionStatus::Disconnected,
                    height: None,
                    aggregation: AggregationResult::default(),
                    window: None,
                }
            }
        };

        self.phase.send_replace(CyclePhase::Publishing);
        let snapshot = self.monitor.snapshot().publish(update);
        self.phase.send_replace(CyclePhase::Idle);

        debug!(
            height = ?snapshot.height,
            status = ?snapshot.status,
            transactions = snapshot.aggregation.transaction_count,
            volume_btc = snapshot.aggregation.total_volume_btc(),
            "Published metrics snapshot"
        );
        snapshot
    }

    /// Loops cycles until `shutdown_signal` completes. Never returns early on
    /// node errors.
    pub async fn run(self, shutdown_signal: impl Future<Output = ()> + Send) {
        info!(
            "Refresh scheduler started, interval {:?}, window {} blocks",
            self.interval,
            self.monitor.window_size()
        );
        tokio::pin!(shutdown_signal);

        loop {
            tokio::select! {
                _ = &mut shutdown_signal => break,
                _ = self.run_cycle() => {}
            }
            tokio::select! {
                _ = &mut shutdown_signal => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Refresh scheduler stopped");
    }
}
