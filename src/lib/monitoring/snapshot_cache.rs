//! Snapshot cache for monitoring data
//!
//! This module holds the most recent result of the refresh cycle so that the
//! `/metrics` and `/summary` endpoints never touch the node.
//!
//! ## Problem
//!
//! Scanning the window costs dozens of RPC round trips. Doing that per scrape
//! would let anyone hammering `/metrics` hammer the node as well.
//!
//! ## Solution
//!
//! The refresh scheduler publishes a complete [`MetricsSnapshot`] once per
//! cycle; readers clone the latest one under a read lock. A publish replaces
//! the whole value under a single write lock, so a reader sees either the
//! previous cycle or the new one, never a mix.
//!
//! ```text
//! RefreshScheduler                  HTTP handlers
//! ────────────────                  ─────────────
//!     │ scan → aggregate                 │
//!     │                                  │
//!     └──────────── publish ─────────────┤
//!                                        │
//!                              ┌─────────▼─────────┐
//!                              │  SnapshotCache    │
//!                              │  (RwLock, fast)   │
//!                              └─────────┬─────────┘
//!                                        │
//!                         ┌──────────────┴──────────────┐
//!                         │                             │
//!                   ┌─────▼─────┐                 ┌─────▼─────┐
//!                   │ /metrics  │                 │ /summary  │
//!                   └───────────┘                 └───────────┘
//! ```

use std::{
    sync::{PoisonError, RwLock},
    time::{Duration, Instant},
};

use serde::Serialize;
use utoipa::ToSchema;

use crate::aggregator::AggregationResult;

/// Whether the last cycle could read the chain height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
}

impl ConnectionStatus {
    /// 1 for connected, 0 for disconnected.
    pub fn as_gauge(&self) -> f64 {
        match self {
            ConnectionStatus::Connected => 1.0,
            ConnectionStatus::Disconnected => 0.0,
        }
    }
}

/// Shape of the window a cycle actually scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct WindowStats {
    /// Tip height the window was anchored at
    pub tip: u64,
    /// Heights the window covered
    pub planned: u64,
    /// Blocks that were fetched and aggregated
    pub scanned: u64,
}

impl WindowStats {
    /// True when some heights of the window could not be fetched.
    pub fn is_partial(&self) -> bool {
        self.scanned < self.planned
    }
}

/// What one refresh cycle hands to [`SnapshotCache::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotUpdate {
    pub status: ConnectionStatus,
    /// `None` when the height query failed; the last known height is kept.
    pub height: Option<u64>,
    pub aggregation: AggregationResult,
    pub window: Option<WindowStats>,
}

/// Point-in-time copy of the monitor's view of the node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// When this snapshot was published; `None` before the first cycle.
    pub timestamp: Option<Instant>,
    /// Last known chain height.
    pub height: Option<u64>,
    pub status: ConnectionStatus,
    /// Aggregation at threshold zero over the cycle's window.
    pub aggregation: AggregationResult,
    pub window: Option<WindowStats>,
}

impl MetricsSnapshot {
    /// Check if this snapshot is stale (older than the given duration)
    pub fn is_stale(&self, max_age: Duration) -> bool {
        match self.timestamp {
            None => true,
            Some(ts) => ts.elapsed() > max_age,
        }
    }

    /// Get the age of this snapshot
    pub fn age(&self) -> Option<Duration> {
        self.timestamp.map(|ts| ts.elapsed())
    }
}

/// Holds the latest [`MetricsSnapshot`]. One writer, any number of readers.
#[derive(Debug)]
pub struct SnapshotCache {
    snapshot: RwLock<MetricsSnapshot>,
    refresh_interval: Duration,
}

impl SnapshotCache {
    /// Create an empty cache that expects a publish every `refresh_interval`.
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            snapshot: RwLock::new(MetricsSnapshot::default()),
            refresh_interval,
        }
    }

    /// Get the current snapshot.
    ///
    /// The returned snapshot may be up to `refresh_interval` old (longer if a
    /// cycle is stuck on the node).
    pub fn read(&self) -> MetricsSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the snapshot with the outcome of a cycle.
    ///
    /// Every field is written under the same write lock.
    pub fn publish(&self, update: SnapshotUpdate) -> MetricsSnapshot {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let height = update.height.or(guard.height);
        *guard = MetricsSnapshot {
            timestamp: Some(Instant::now()),
            height,
            status: update.status,
            aggregation: update.aggregation,
            window: update.window,
        };
        guard.clone()
    }

    /// Get the refresh interval
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
}
