//! HTTP server for the query surface, using Axum

use super::{
    prometheus_metrics::PrometheusMetrics,
    snapshot_cache::{ConnectionStatus, WindowStats},
    summary::format_summary,
};
use crate::{aggregator::Threshold, error::NodeMonitorError, monitor::ChainMonitor};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::{
    future::Future,
    net::SocketAddr,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};

const CHAIN_STATUS: &str = "/chainStatus";
const TRANSACTIONS_SUMMARY: &str = "/getTransactionsSummary";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bitcoin Node Monitor API",
        version = "0.1.0",
        description = "Chain status, transaction activity and metrics of a Bitcoin node"
    ),
    paths(
        handle_health,
        handle_chain_status,
        handle_transactions_summary,
        handle_snapshot,
    ),
    components(schemas(
        HealthResponse,
        ErrorResponse,
        ChainStatusResponse,
        TransactionsSummaryResponse,
        SnapshotResponse,
        ConnectionStatus,
        WindowStats,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "chain", description = "On-demand queries against the node"),
        (name = "snapshot", description = "Latest refresh cycle")
    )
)]
struct ApiDoc;

/// Shared state for all HTTP handlers
#[derive(Clone)]
struct ServerState {
    monitor: Arc<ChainMonitor>,
    metrics: PrometheusMetrics,
    start_time: u64,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
struct SummaryQuery {
    /// Minimum output value in BTC, exclusive (default: 0)
    threshold: Option<String>,
}

impl SummaryQuery {
    fn threshold(&self) -> Result<Threshold, String> {
        let raw = match self.threshold.as_deref().map(str::trim) {
            None | Some("") => return Ok(Threshold::ZERO),
            Some(raw) => raw,
        };
        let btc: f64 = raw
            .parse()
            .map_err(|_| format!("Invalid threshold: {raw}"))?;
        Threshold::from_btc(btc).map_err(|e| e.to_string())
    }
}

/// HTTP server that exposes the monitor's queries and metrics
pub struct MonitoringServer {
    bind_address: SocketAddr,
    state: ServerState,
}

impl MonitoringServer {
    /// Create a new server in front of `monitor`.
    ///
    /// Only the registry is built here; nothing is bound until [`run`](Self::run).
    pub fn new(
        bind_address: SocketAddr,
        monitor: Arc<ChainMonitor>,
    ) -> Result<Self, NodeMonitorError> {
        Ok(Self {
            bind_address,
            state: ServerState {
                monitor,
                metrics: PrometheusMetrics::new()?,
                start_time: unix_now(),
            },
        })
    }

    /// The full route table, with state attached.
    pub fn router(&self) -> Router {
        let api_v1 = Router::new()
            .route("/health", get(handle_health))
            .route("/snapshot", get(handle_snapshot));

        Router::new()
            .route("/", get(handle_root))
            .route(CHAIN_STATUS, get(handle_chain_status))
            .route(TRANSACTIONS_SUMMARY, get(handle_transactions_summary))
            .route("/summary", get(handle_summary))
            .route("/metrics", get(handle_prometheus_metrics))
            .route("/api-docs/openapi.json", get(handle_openapi))
            .nest("/api/v1", api_v1)
            .with_state(self.state.clone())
    }

    /// Run the server until the shutdown signal completes
    ///
    /// Automatically exposes:
    /// - OpenAPI document at `/api-docs/openapi.json`
    /// - Prometheus metrics at `/metrics`
    pub async fn run(
        self,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), NodeMonitorError> {
        info!("Starting monitoring server on http://{}", self.bind_address);

        let app = self.router();
        let listener =
            TcpListener::bind(self.bind_address)
                .await
                .map_err(|source| NodeMonitorError::Bind {
                    address: self.bind_address,
                    source,
                })?;

        info!(
            "Prometheus metrics available at http://{}/metrics",
            self.bind_address
        );

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal.await;
                info!("Monitoring server received shutdown signal, stopping...");
            })
            .await;

        info!("Monitoring server stopped");
        result.map_err(NodeMonitorError::Server)
    }
}

// Response types - used for both actual responses and OpenAPI documentation
#[derive(Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    timestamp: u64,
    uptime_secs: u64,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize, ToSchema)]
struct ChainStatusResponse {
    chain: String,
    last_block_height: u64,
}

#[derive(Serialize, ToSchema)]
struct TransactionsSummaryResponse {
    total_transactions: u64,
    total_btc: f64,
}

#[derive(Serialize, ToSchema)]
struct SnapshotResponse {
    /// Last known chain height; absent until a cycle has read it
    height: Option<u64>,
    status: ConnectionStatus,
    transaction_count: u64,
    total_btc: f64,
    /// Window scanned by the last cycle; absent when it could not read the tip
    window: Option<WindowStats>,
    /// Seconds since the last publish; absent before the first cycle
    age_secs: Option<u64>,
    /// True when no cycle has published within the refresh interval
    stale: bool,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Root endpoint - lists all available APIs
async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "Bitcoin Node Monitor",
        "version": "0.1.0",
        "endpoints": {
            "/": "This endpoint - API listing",
            "/chainStatus": "Current block height, straight from the node",
            "/getTransactionsSummary?threshold=T": "Transactions above T BTC in the recent window",
            "/summary": "Human-readable node and transaction summary",
            "/metrics": "Prometheus metrics",
            "/api/v1/health": "Health check",
            "/api/v1/snapshot": "Result of the last refresh cycle",
            "/api-docs/openapi.json": "OpenAPI document"
        }
    }))
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
async fn handle_health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let timestamp = unix_now();
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp,
        uptime_secs: timestamp.saturating_sub(state.start_time),
    })
}

/// Current chain height, read from the node on every call
#[utoipa::path(
    get,
    path = "/chainStatus",
    tag = "chain",
    responses(
        (status = 200, description = "Node reachable", body = ChainStatusResponse),
        (status = 500, description = "Height query failed", body = ErrorResponse)
    )
)]
async fn handle_chain_status(State(state): State<ServerState>) -> Response {
    let _timer = state.metrics.start_request(CHAIN_STATUS);

    match state.monitor.chain_status().await {
        Ok(height) => Json(ChainStatusResponse {
            chain: "OK".to_string(),
            last_block_height: height,
        })
        .into_response(),
        Err(e) => {
            error!("Error getting block count: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error getting block count: {}", e),
            )
        }
    }
}

/// Count and volume of transactions above a threshold, scanned on demand
#[utoipa::path(
    get,
    path = "/getTransactionsSummary",
    tag = "chain",
    params(SummaryQuery),
    responses(
        (status = 200, description = "Aggregation over the recent window", body = TransactionsSummaryResponse),
        (status = 400, description = "Threshold is not a non-negative number", body = ErrorResponse)
    )
)]
async fn handle_transactions_summary(
    Query(params): Query<SummaryQuery>,
    State(state): State<ServerState>,
) -> Response {
    let _timer = state.metrics.start_request(TRANSACTIONS_SUMMARY);

    let threshold = match params.threshold() {
        Ok(threshold) => threshold,
        Err(e) => {
            warn!("Rejected transactions summary request: {}", e);
            return error_response(StatusCode::BAD_REQUEST, e);
        }
    };

    let summary = state.monitor.transactions_summary(threshold).await;
    Json(TransactionsSummaryResponse {
        total_transactions: summary.aggregation.transaction_count,
        total_btc: summary.aggregation.total_volume_btc(),
    })
    .into_response()
}

/// Result of the last refresh cycle
#[utoipa::path(
    get,
    path = "/api/v1/snapshot",
    tag = "snapshot",
    responses(
        (status = 200, description = "Latest published snapshot", body = SnapshotResponse)
    )
)]
async fn handle_snapshot(State(state): State<ServerState>) -> Json<SnapshotResponse> {
    let cache = state.monitor.snapshot();
    let snapshot = cache.read();

    Json(SnapshotResponse {
        height: snapshot.height,
        status: snapshot.status,
        transaction_count: snapshot.aggregation.transaction_count,
        total_btc: snapshot.aggregation.total_volume_btc(),
        window: snapshot.window,
        age_secs: snapshot.age().map(|age| age.as_secs()),
        stale: snapshot.is_stale(cache.refresh_interval()),
    })
}

/// Human-readable report of the snapshot gauges
async fn handle_summary(State(state): State<ServerState>) -> Response {
    let families = state
        .metrics
        .gather_snapshot(&state.monitor.snapshot().read());

    let text = format_summary(&families);
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response()
}

/// Handler for Prometheus metrics endpoint
async fn handle_prometheus_metrics(State(state): State<ServerState>) -> Response {
    match state
        .metrics
        .encode_snapshot(&state.monitor.snapshot().read())
    {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Encoding error: {}", e),
        ),
    }
}

async fn handle_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
