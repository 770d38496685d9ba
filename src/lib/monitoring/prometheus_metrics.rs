//! Prometheus metrics exposed on `/metrics`.
//!
//! The four node gauges mirror the [`MetricsSnapshot`] and are refreshed from
//! it at scrape time. The request counter and duration histogram are updated
//! by the query handlers themselves.

use std::sync::{Arc, Mutex, PoisonError};

use prometheus::{
    proto::MetricFamily, Encoder, Gauge, HistogramOpts, HistogramTimer, HistogramVec,
    IntCounterVec, Opts, Registry, TextEncoder,
};

use super::snapshot_cache::MetricsSnapshot;

pub const BLOCK_HEIGHT: &str = "bitcoin_node_block_height";
pub const CONNECTION_STATUS: &str = "bitcoin_node_connection_status";
pub const TRANSACTIONS_ABOVE_THRESHOLD: &str = "transactions_above_threshold_total";
pub const VOLUME_ABOVE_THRESHOLD: &str = "btc_volume_above_threshold";

const REQUEST_DURATION_BUCKETS: [f64; 3] = [0.01, 0.1, 1.0];

#[derive(Clone)]
pub struct PrometheusMetrics {
    pub registry: Registry,
    pub node_block_height: Gauge,
    pub node_connection_status: Gauge,
    pub transactions_above_threshold: Gauge,
    pub volume_above_threshold: Gauge,
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
    /// Held from setting the node gauges until they are gathered.
    scrape: Arc<Mutex<()>>,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let node_block_height = Gauge::with_opts(Opts::new(
            BLOCK_HEIGHT,
            "Current block height of the Bitcoin node",
        ))?;
        registry.register(Box::new(node_block_height.clone()))?;

        let node_connection_status = Gauge::with_opts(Opts::new(
            CONNECTION_STATUS,
            "Connection status to the Bitcoin node (1 = connected, 0 = disconnected)",
        ))?;
        registry.register(Box::new(node_connection_status.clone()))?;

        let transactions_above_threshold = Gauge::with_opts(Opts::new(
            TRANSACTIONS_ABOVE_THRESHOLD,
            "Total number of transactions above the threshold in the scanned window",
        ))?;
        registry.register(Box::new(transactions_above_threshold.clone()))?;

        let volume_above_threshold = Gauge::with_opts(Opts::new(
            VOLUME_ABOVE_THRESHOLD,
            "Total BTC volume of transactions above the threshold in the scanned window",
        ))?;
        registry.register(Box::new(volume_above_threshold.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["endpoint"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Duration of HTTP requests in seconds",
            )
            .buckets(REQUEST_DURATION_BUCKETS.to_vec()),
            &["endpoint"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            node_block_height,
            node_connection_status,
            transactions_above_threshold,
            volume_above_threshold,
            http_requests_total,
            http_request_duration_seconds,
            scrape: Arc::new(Mutex::new(())),
        })
    }

    /// Gather every registered metric with the node gauges taken from
    /// `snapshot`.
    ///
    /// Concurrent scrapes share the gauges, so each one holds the scrape lock
    /// until its own values have been gathered.
    pub fn gather_snapshot(&self, snapshot: &MetricsSnapshot) -> Vec<MetricFamily> {
        let _scrape = self.scrape.lock().unwrap_or_else(PoisonError::into_inner);
        self.observe_snapshot(snapshot);
        self.registry.gather()
    }

    /// Render [`gather_snapshot`](Self::gather_snapshot) in the text
    /// exposition format.
    pub fn encode_snapshot(
        &self,
        snapshot: &MetricsSnapshot,
    ) -> Result<String, prometheus::Error> {
        let families = self.gather_snapshot(snapshot);
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Copy the snapshot into the node gauges.
    ///
    /// The height gauge keeps its previous value until a height is known.
    fn observe_snapshot(&self, snapshot: &MetricsSnapshot) {
        if let Some(height) = snapshot.height {
            self.node_block_height.set(height as f64);
        }
        self.node_connection_status.set(snapshot.status.as_gauge());
        self.transactions_above_threshold
            .set(snapshot.aggregation.transaction_count as f64);
        self.volume_above_threshold
            .set(snapshot.aggregation.total_volume_btc());
    }

    /// Count a request to `endpoint` and time it until the returned timer drops.
    pub fn start_request(&self, endpoint: &str) -> HistogramTimer {
        self.http_requests_total
            .with_label_values(&[endpoint])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[endpoint])
            .start_timer()
    }
}
