use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nettest::auth::{MemoryRevocationStore, RevocationStore, SqliteRevocationStore, TokenService};
use nettest::config::{Config, RevocationBackend};
use nettest::AppState;

#[derive(Parser, Debug)]
#[command(name = "nettest")]
#[command(author, version, about = "Ordering backend for network modeling services", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "nettest.toml", env = "NETTEST_CONFIG")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

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

    tracing::info!("Starting nettest v{}", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&config.server.data_dir)?;

    let db = nettest::db::init(&config.server.data_dir).await?;

    nettest::db::ensure_admin_user(
        &db,
        &config.auth.admin_login,
        config.auth.admin_password.as_deref(),
        &config.auth.admin_name,
    )
    .await?;

    if config.catalog.seed {
        nettest::db::seed_modelings(&db).await?;
    }

    let revoked: Arc<dyn RevocationStore> = match config.auth.revocation {
        RevocationBackend::Sqlite => Arc::new(SqliteRevocationStore::new(db.clone())),
        RevocationBackend::Memory => {
            tracing::warn!("Revocations are kept in memory and are lost on restart");
            Arc::new(MemoryRevocationStore::new())
        }
    };
    let tokens = Arc::new(TokenService::new(
        &config.auth.jwt_secret,
        chrono::Duration::hours(config.auth.token_ttl_hours),
        revoked,
    ));

    let blobs = nettest::storage::from_config(&config.storage)?;

    nettest::engine::spawn_revocation_purge_task(
        tokens.clone(),
        config.auth.revocation_purge_interval,
    );

    let metrics_handle = nettest::api::metrics::init_metrics()?;
    let state = Arc::new(
        AppState::new(config.clone(), db, tokens, blobs).with_metrics(metrics_handle),
    );

    let app = nettest::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

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
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
