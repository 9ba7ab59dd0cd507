//! keepfs -- single-tenant file server.
//!
//! Serves one directory over HTTP. Callers identify with Basic credentials
//! checked against a JSON accounts file, which is reloaded whenever it
//! changes on disk.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use keepfs::auth::Auth;
use keepfs::config::{Config, LoggingConfig};
use keepfs::store::{AccountStore, FileStore};

/// Command-line arguments for the keepfs server.
#[derive(Parser, Debug)]
#[command(name = "keepfs", version, about = "Single-tenant file server")]
struct Cli {
    /// Path to the YAML configuration file. Defaults are used if omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the directory to serve.
    #[arg(short, long)]
    data: Option<String>,

    /// Override the accounts file.
    #[arg(short, long)]
    accounts: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => keepfs::config::load_config(path)?,
        None => Config::default(),
    };
    if let Some(data) = cli.data {
        config.storage.data_dir = data;
    }
    if let Some(accounts) = cli.accounts {
        config.auth.accounts_file = accounts;
    }

    init_tracing(&config.logging);
    match &cli.config {
        Some(path) => info!("Loaded configuration from {}", path),
        None => info!("No configuration file given, using defaults"),
    }

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    // A missing or malformed accounts file is fatal at startup.
    let store = Arc::new(FileStore::open(&config.auth.accounts_file)?);
    info!(
        "Loaded {} accounts from {}",
        store.accounts().len(),
        config.auth.accounts_file
    );
    if config.auth.watch {
        store.spawn_watcher(Duration::from_millis(config.auth.watch_interval_ms));
    }

    let store: Arc<dyn AccountStore> = store;
    let auth = Auth::new(store, config.auth.anonymous.account());

    std::fs::create_dir_all(&config.storage.data_dir)?;
    info!("Serving files from {}", config.storage.data_dir);

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(keepfs::AppState { config, auth });
    let app = keepfs::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("keepfs listening on {}", bind_addr);

    // On SIGTERM/SIGINT stop accepting connections and give in-flight
    // requests `shutdown_timeout` to finish.
    let (stopping_tx, stopping_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = stopping_tx.send(());
    });
    let mut server = tokio::spawn(async move { server.await });

    let deadline = async move {
        match stopping_rx.await {
            Ok(()) => tokio::time::sleep(shutdown_timeout).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = &mut server => result??,
        _ = deadline => warn!(
            "In-flight requests still running after {}s, exiting",
            shutdown_timeout.as_secs()
        ),
    }

    info!("keepfs shut down");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        "text" => builder.init(),
        other => {
            builder.init();
            warn!("Unknown log format '{}', using text", other);
        }
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
