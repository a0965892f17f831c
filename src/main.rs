use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sports_scheduler::config::Config;
use sports_scheduler::AppState;

#[derive(Parser, Debug)]
#[command(name = "sports-scheduler")]
#[command(author, version, about = "Pick-up sports session scheduler", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "SCHEDULER_CONFIG", default_value = "scheduler.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting sports-scheduler v{}", env!("CARGO_PKG_VERSION"));
    if cli.config.exists() {
        tracing::info!("Loaded configuration from {}", cli.config.display());
    } else {
        tracing::info!("No config file found, using defaults");
    }
    config.auth.ensure_jwt_secret();
    tracing::info!(
        window_minutes = config.scheduling.conflict_window_minutes,
        "Conflict window configured"
    );

    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.server.data_dir.display()
        )
    })?;

    // Initialize database
    let db = sports_scheduler::db::init(&config.server.data_dir).await?;

    // Ensure configured admin user exists
    sports_scheduler::api::auth::ensure_admin_user(&db, &config.auth).await?;

    let addr = config.server.bind_addr()?;
    let static_dir = config.server.static_dir.clone();
    let state = Arc::new(AppState::new(config, db));

    let api_router = sports_scheduler::api::create_router(state);

    // Frontend assets with SPA fallback, when configured
    let app = match static_dir {
        Some(dir) => {
            tracing::info!("Serving static files from {}", dir.display());
            let index_file = dir.join("index.html");
            let serve_static = ServeDir::new(&dir).not_found_service(ServeFile::new(&index_file));
            api_router.fallback_service(serve_static)
        }
        None => api_router,
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
