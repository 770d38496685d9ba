//! ## Configuration Module
//!
//! Defines [`NodeMonitorConfig`], the configuration structure for the monitor, along with
//! [`NodeConfig`] describing how to reach the Bitcoin node.
//!
//! Configuration is read from a TOML file and can be overridden from the environment with the
//! `NODE_MONITOR__` prefix, using `__` to separate nested keys (e.g.
//! `NODE_MONITOR__NODE__PASSWORD`).
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use ext_config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::{
    error::ConfigError,
    node::{RetryPolicy, RpcCredentials},
};

/// Configuration for the monitor: where to listen, what to scan and how often.
#[derive(Clone, Debug, Deserialize)]
pub struct NodeMonitorConfig {
    #[serde(default = "default_listen_address")]
    listen_address: SocketAddr,
    #[serde(default = "default_window_size")]
    window_size: u64,
    #[serde(default = "default_refresh_interval_secs")]
    refresh_interval_secs: u64,
    #[serde(default)]
    log_file: Option<PathBuf>,
    node: NodeConfig,
}

/// Connection settings for the Bitcoin node's RPC interface.
#[derive(Clone, Debug, Deserialize)]
pub struct NodeConfig {
    url: String,
    user: String,
    password: String,
    #[serde(default = "default_rpc_timeout_secs")]
    rpc_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    retry_delay_secs: u64,
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_window_size() -> u64 {
    25
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_secs() -> u64 {
    5
}

impl NodeMonitorConfig {
    /// Creates a new instance of the [`NodeMonitorConfig`] with default scanning parameters.
    pub fn new(listen_address: SocketAddr, node: NodeConfig) -> Self {
        Self {
            listen_address,
            window_size: default_window_size(),
            refresh_interval_secs: default_refresh_interval_secs(),
            log_file: None,
            node,
        }
    }

    /// Loads the configuration from a TOML file, applying environment overrides, and
    /// validates it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix("NODE_MONITOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the monitor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::Invalid(
                "window_size must be at least 1".to_string(),
            ));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "refresh_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.node.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "node.max_retries must be at least 1".to_string(),
            ));
        }
        if self.node.url.is_empty() {
            return Err(ConfigError::Invalid("node.url must be set".to_string()));
        }
        Ok(())
    }

    /// Returns the HTTP listening address.
    pub fn listen_address(&self) -> &SocketAddr {
        &self.listen_address
    }

    /// Returns the number of most recent blocks scanned per aggregation.
    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    /// Returns the period between two refresh cycles.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Returns the node connection settings.
    pub fn node(&self) -> &NodeConfig {
        &self.node
    }

    /// Returns the log file, if logging to a file is configured.
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Sets the log file. `None` keeps the configured value.
    pub fn set_log_file(&mut self, log_file: Option<PathBuf>) {
        if let Some(log_file) = log_file {
            self.log_file = Some(log_file);
        }
    }
}

impl NodeConfig {
    pub fn new(url: String, user: String, password: String) -> Self {
        Self {
            url,
            user,
            password,
            rpc_timeout_secs: default_rpc_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }

    /// Returns the node RPC URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the RPC credentials.
    pub fn credentials(&self) -> RpcCredentials {
        RpcCredentials {
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }

    /// Returns the deadline applied to every RPC call.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Returns the startup connection retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}
