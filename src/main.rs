use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use poppo::config::Config;
use poppo::AppState;

#[derive(Parser, Debug)]
#[command(name = "poppo")]
#[command(author, version, about = "Keep track of your plushies and chat with them", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "poppo.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Override listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

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

    tracing::info!("Starting poppo v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        strategy = ?config.auth.strategy,
        max_users = config.auth.max_users,
        "Authentication configured"
    );

    poppo::utils::ensure_dir(&config.server.data_dir)?;
    poppo::utils::ensure_dir(&config.uploads.dir)?;

    let db = poppo::db::init(&config.server.data_dir).await?;

    let state = Arc::new(AppState::from_config(config.clone(), db)?);

    let api_router = poppo::api::create_router(state);

    // Serve the built front-end with SPA fallback when it is present
    let static_dir = &config.server.static_dir;
    let app = if static_dir.is_dir() {
        tracing::info!("Serving front-end from {}", static_dir.display());
        let serve_static =
            ServeDir::new(static_dir).not_found_service(ServeFile::new(static_dir.join("index.html")));
        api_router.fallback_service(serve_static)
    } else {
        api_router
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
