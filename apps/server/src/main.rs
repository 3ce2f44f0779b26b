//! Headless server binary bridging a local AES67 audio daemon into NMOS
//! IS-04/IS-05 for a single capture/playback receiver.

mod config;

use std::path::PathBuf;

use aes67_core::runtime::TaskSpawner;
use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;

use crate::config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "aes67-nmos-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "AES67_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// HTTP port to bind the IS-04/IS-05 surfaces to.
    #[arg(short = 'p', long, env = "AES67_HTTP_PORT")]
    http_port: Option<u16>,

    /// Path to the persisted runtime state file.
    #[arg(short = 's', long, env = "AES67_STATE_FILE")]
    state_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("aes67-nmos-bridge v{}", env!("CARGO_PKG_VERSION"));

    let mut server_config =
        ServerConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = args.http_port {
        server_config.http_port = port;
    }
    if let Some(state_file) = args.state_file {
        server_config.state_file = state_file;
    }

    let core_config = server_config.to_core_config();
    log::info!(
        "configuration: http_port={}, registry_mode={:?}, state_file={}",
        core_config.http_port,
        core_config.registry.mode,
        core_config.state_file.display()
    );

    let services = aes67_core::bootstrap(core_config, None);
    let spawner = aes67_core::runtime::TokioSpawner::current();

    {
        let worker = services.is04_worker.clone();
        spawner.spawn(async move { worker.run().await });
    }
    {
        let monitor = services.daemon_monitor.clone();
        spawner.spawn(async move { monitor.run().await });
    }

    let router = aes67_core::create_router(services.app_state.clone());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", services.config.http_port))
        .await
        .context("failed to bind HTTP listener")?;
    let bound_port = listener.local_addr().context("failed to read bound port")?.port();
    log::info!("HTTP surface listening on 0.0.0.0:{bound_port}");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            log::error!("HTTP server error: {e}");
        }
    });

    shutdown_signal().await;
    log::info!("shutdown signal received, cleaning up");

    services.is04_worker.stop();
    services.daemon_monitor.stop();
    server_handle.abort();

    // Give the worker's best-effort deregistration a moment to land before exit.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    log::info!("shutdown complete");
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
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
