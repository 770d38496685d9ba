use std::{fs::OpenOptions, path::PathBuf, sync::Mutex};

use clap::Parser;
use node_monitor::{config::NodeMonitorConfig, error::NodeMonitorError, NodeMonitor};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "node_monitor",
    about = "Monitors a Bitcoin node and serves chain metrics over HTTP",
    version
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(
        short = 'c',
        long = "config",
        value_name = "PATH",
        default_value = "node-monitor-config.toml"
    )]
    config: PathBuf,

    /// Write logs to this file instead of stdout.
    #[arg(short = 'f', long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn init_logging(config: &NodeMonitorConfig) -> Result<(), NodeMonitorError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter);

    let result = match config.log_file() {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    NodeMonitorError::Logging(format!("cannot open {}: {}", path.display(), e))
                })?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.try_init(),
    };
    result.map_err(|e| NodeMonitorError::Logging(e.to_string()))
}

async fn run(args: Args) -> Result<(), NodeMonitorError> {
    let mut config = NodeMonitorConfig::from_file(&args.config)?;
    config.set_log_file(args.log_file);
    init_logging(&config)?;

    info!("Loaded configuration from {}", args.config.display());
    NodeMonitor::new(config).start().await
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        // Logging may not be up yet when configuration fails.
        eprintln!("node_monitor: {e}");
        error!("{e}");
        std::process::exit(1);
    }
}
