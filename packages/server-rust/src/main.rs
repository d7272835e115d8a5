//! The cacher server binary.
//!
//! Wires configuration, the process log, the cache manager, and the chosen
//! network surface together, then runs until a shutdown signal arrives. On
//! shutdown the snapshot store is flushed, a short grace delay elapses, and
//! the process exits with code 1, preserving the historical behavior.

use std::fs::OpenOptions;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cacher_server::config::{Config, Interface};
use cacher_server::manager::CacheManager;
use cacher_server::network::http::{self, AppState};
use cacher_server::network::shell;

fn init_logging(config: &Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.log_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_dir.join("cacher.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    config.validate()?;
    init_logging(&config)?;

    let manager = match CacheManager::new(&config.cache_options()) {
        Ok(manager) => Arc::new(manager),
        Err(err) => {
            error!(error = %err, "error while initializing cache manager");
            return Err(err.into());
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let addr = config.bind_addr();
    match config.interface {
        Interface::Http => {
            let state = AppState {
                manager: Arc::clone(&manager),
                auth_token: Arc::from(config.auth_token.clone().unwrap_or_default()),
            };
            let mut shutdown = shutdown_rx;
            http::serve(&addr, state, async move {
                let _ = shutdown.changed().await;
            })
            .await?;
        }
        Interface::Telnet => {
            shell::serve(&addr, Arc::clone(&manager), shutdown_rx).await?;
        }
    }

    info!("Shutting down Cacher...");
    if let Err(err) = manager.close() {
        error!(error = %err, "error while closing the cache manager");
    }
    tokio::time::sleep(Duration::from_secs(2)).await;
    std::process::exit(1);
}
