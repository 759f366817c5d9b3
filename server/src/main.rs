//! Leaf Classifier Server
//!
//! HTTP front end for the plant leaf disease classifier: an upload page, a
//! JSON prediction API for the mobile client, uploaded-file serving and a
//! health check.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use leaf_classifier::backend::{negotiate, DevicePreference};
use leaf_classifier::inference::{load_classifier, DEFAULT_LOW_CONFIDENCE_THRESHOLD};
use leaf_classifier::utils::logging::{init_logging, LogConfig, LogLevel};

use crate::state::{AppState, ServerConfig, DEFAULT_PORT};

/// Leaf Classifier Server
#[derive(Parser, Debug)]
#[command(name = "leaf-classifier-server")]
#[command(version)]
#[command(about = "HTTP server for plant leaf disease classification")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Weight bundle (.mpk with a .json manifest alongside)
    #[arg(short, long, env = "LEAF_WEIGHTS", default_value = "models/leaf_classifier.mpk")]
    weights: PathBuf,

    /// Directory uploaded images are stored in
    #[arg(long, env = "LEAF_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Directory with static assets (logo)
    #[arg(long, env = "LEAF_STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,

    /// Compute device: auto, cpu, cuda or cuda:N
    #[arg(long, env = "LEAF_DEVICE", default_value = "auto")]
    device: DevicePreference,

    /// Maximum request body size in MiB
    #[arg(long, default_value_t = 16)]
    max_upload_mb: usize,

    /// Confidence below which API results are flagged uncertain
    #[arg(long, default_value_t = DEFAULT_LOW_CONFIDENCE_THRESHOLD)]
    low_confidence_threshold: f32,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, env = "LEAF_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            port: cli.port,
            weights: cli.weights,
            upload_dir: cli.upload_dir,
            static_dir: cli.static_dir,
            device: cli.device,
            max_upload_mb: cli.max_upload_mb,
            low_confidence_threshold: cli.low_confidence_threshold,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let log_config = LogConfig::production().with_level(LogLevel::parse(&cli.log_level));
    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    // Build configuration
    let config = ServerConfig::from(cli);
    config.validate()?;

    info!("Leaf Classifier Server v{}", leaf_classifier::VERSION);
    info!("Configuration:");
    info!("  Weights:     {:?}", config.weights);
    info!("  Upload dir:  {:?}", config.upload_dir);
    info!("  Static dir:  {:?}", config.static_dir);
    info!("  Device:      {:?}", config.device);
    info!("  Max upload:  {} MiB", config.max_upload_mb);
    info!("  Uncertain <  {:.2}", config.low_confidence_threshold);

    std::fs::create_dir_all(&config.upload_dir)?;

    // Device and model are fixed for the lifetime of the process
    let target = negotiate(config.device);
    let classifier = load_classifier(&config.weights, target)?;
    info!(
        "Model ready on {} with {} classes: {}",
        target,
        classifier.labels().len(),
        classifier.labels().as_slice().join(", ")
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    // Create shared state
    let state = Arc::new(AppState::new(config, classifier));
    let app = routes::router(state);

    // Start server
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
