//! Startup helpers for the semantic memory server.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;

use crate::memory::core::config::EngineConfig;
use crate::server::{self, AppState};

/// Environment variable naming an optional JSON config file.
pub const ENV_CONFIG_PATH: &str = "SEMANTIC_MEMORY_CONFIG";

/// Run the server (used by the `semantic-memory-server` binary).
///
/// The config file is taken from the first argument, else from `SEMANTIC_MEMORY_CONFIG`.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();
    tracing::info!("starting semantic memory v{}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve(config_path())) {
        tracing::error!("server error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Install the `fmt` subscriber, honouring `RUST_LOG` and defaulting to `info`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // A second call (tests, embedding in another binary) keeps the existing subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from))
}

/// Open the engine, start the backfill worker and serve until Ctrl-C.
///
/// # Errors
/// Returns an error if the config is invalid, the store cannot be opened or the server fails.
pub async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = EngineConfig::load(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("loading config from {}", path.display()),
        None => "loading default config".to_string(),
    })?;
    let port = config.server.port;
    tracing::info!(
        db = %config.storage.sqlite_path.display(),
        embedding = %config.embedding.base_url,
        port,
        "configuration loaded"
    );

    let state = AppState::from_config(config)
        .await
        .context("opening memory engine")?;

    let backfill = state.engine.backfill();
    let backfill_shutdown = backfill.shutdown_notifier();
    let backfill_handle = backfill.spawn();

    server::run_server_with_shutdown(state, port, shutdown_signal())
        .await
        .context("http server")?;

    backfill_shutdown.notify_one();
    if let Err(e) = backfill_handle.await {
        tracing::warn!("backfill worker ended abnormally: {e}");
    }
    tracing::info!("semantic memory stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
