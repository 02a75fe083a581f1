use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use quizroom::config::{self, ServerConfig};
use quizroom::registry::Registry;
use quizroom::server::{self, AppState};
use quizroom::store::{JsonDirResultStore, MemoryResultStore, ResultStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    config::init().context("initializing config directory")?;
    let config = ServerConfig::load().context("loading server config")?;
    let quizzes = config::load_quizzes();
    info!(count = quizzes.len(), "quiz library loaded");

    let store: Arc<dyn ResultStore> = match &config.results_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "storing results as JSON files");
            Arc::new(JsonDirResultStore::new(dir))
        }
        None => Arc::new(MemoryResultStore::new()),
    };

    let port = config.port;
    let registry = Registry::new(config, store);
    let reaper = registry.spawn_reaper();

    let app = server::router(AppState {
        registry,
        quizzes: Arc::new(quizzes),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await.context("binding server")?;
    info!(%addr, "quiz server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    reaper.abort();
    Ok(())
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
