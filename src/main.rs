use std::sync::Arc;

use archaeopteryx::api::{self, AppState};
use archaeopteryx::cache::{Cache, ValkeyCache};
use archaeopteryx::config::AppConfig;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;

#[derive(Parser)]
#[command(
    name = "archaeopteryx",
    about = "Mastodon-compatible API gateway for the AT Protocol"
)]
struct Cli {
    /// Path to an optional config file; environment variables take
    /// precedence.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = AppConfig::load(Some(&cli.config))?;

    // Init tracing from LOG_LEVEL, with RUST_LOG taking precedence.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "archaeopteryx={},tower_http=info",
                    config.log_level
                ))
            }),
        )
        .json()
        .init();

    if let Err(msg) = config.validate() {
        eprintln!("Configuration error: {msg}");
        return Err(msg.into());
    }

    tracing::info!(
        host = %config.hostname,
        port = config.port,
        upstream = %config.atproto_service_url,
        environment = %config.environment,
        "starting archaeopteryx"
    );

    // The cache must be up before the listener binds. A missing Valkey
    // degrades to the in-process backend: fine for development, but state
    // then dies with the process.
    let cache = match ValkeyCache::connect(&config.valkey_url()).await {
        Ok(valkey) => {
            tracing::info!(
                host = %config.valkey_host,
                port = config.valkey_port,
                db = config.valkey_database,
                "connected to valkey"
            );
            Cache::new(Arc::new(valkey))
        }
        Err(e) => {
            tracing::warn!(error = %e, "valkey unreachable, using in-memory cache");
            Cache::in_memory()
        }
    };

    let state = AppState::new(config.clone(), cache)?;
    let app = api::router(state);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }

    tracing::info!("shutting down...");
}
