//! Monitoring surface of the node monitor.
//!
//! Provides the HTTP query API, Prometheus metrics and the plain-text summary.
//!
//! ## Architecture
//!
//! - **Snapshot**: latest refresh-cycle result, read by `/metrics`, `/summary`
//!   and `/api/v1/snapshot` without touching the node
//! - **On-demand queries**: `/chainStatus` and `/getTransactionsSummary` go to
//!   the node on every call

pub mod http_server;
pub mod prometheus_metrics;
pub mod snapshot_cache;
pub mod summary;

pub use http_server::MonitoringServer;
pub use prometheus_metrics::PrometheusMetrics;
pub use snapshot_cache::{
    ConnectionStatus, MetricsSnapshot, SnapshotCache, SnapshotUpdate, WindowStats,
};
pub use summary::format_summary;
