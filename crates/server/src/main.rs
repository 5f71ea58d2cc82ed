//! Packyard server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use packyard_core::config::AppConfig;
use packyard_server::{AppState, create_router};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Packyard - package publishing server
#[derive(Parser, Debug)]
#[command(name = "packyardd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "PACKYARD_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration from an optional TOML file overlaid with `PACKYARD_` env vars.
fn load_config(config_path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    let has_config_file = std::path::Path::new(config_path).exists();

    if has_config_file {
        tracing::info!(config_path = %config_path, "Loading configuration from file");
        figment = figment.merge(Toml::file(config_path));
    } else {
        tracing::debug!("No config file found at {}", config_path);
    }

    // PACKYARD_CONFIG only names the file
    let has_env_config = std::env::vars()
        .any(|(key, _)| key.starts_with("PACKYARD_") && key != "PACKYARD_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: packyardd --config /path/to/config.toml\n  \
             2. Environment variables: PACKYARD_SERVER__BIND=0.0.0.0:4000 \
             PACKYARD_ADMIN__TOKEN_HASH=sha256:YOUR_TOKEN_HASH_HERE packyardd\n\n\
             See config/server.example.toml for example configuration."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    figment
        .merge(Env::prefixed("PACKYARD_").split("__"))
        .extract()
        .context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Packyard v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    config.validate().context("invalid configuration")?;

    packyard_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = packyard_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    // Fail fast rather than report healthy with unreachable storage.
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!("Storage backend connectivity verified");

    let metadata = packyard_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config, storage, metadata)?;
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

/// Resolve on Ctrl-C. In-flight publishes are dropped, which aborts their uploads.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
