//! Error types for the node monitor.
//!
//! Only startup can fail the process. Once the monitor is running, node
//! failures are absorbed by the scanner and scheduler and show up as degraded
//! metrics instead of errors; see [`crate::node::NodeError`] for the per-call
//! failures they absorb.

use thiserror::Error;

/// The node could not be reached at startup.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to Bitcoin node after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// The configuration file or environment is unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ext_config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level error surfaced to `main`.
#[derive(Debug, Error)]
pub enum NodeMonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("failed to bind HTTP listener on {address}: {source}")]
    Bind {
        address: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Server(#[source] std::io::Error),

    #[error("failed to initialize metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("failed to initialize logging: {0}")]
    Logging(String),
}
