//! promobee
//!
//! Re-exports ecobee thermostat telemetry for Prometheus:
//! 1. Loads the durable ecobee credential written by `promobee register`
//! 2. Polls the ecobee API in the background, refreshing the credential as needed
//! 3. Serves `/thermostats`, `/thermostat?id=` and process `/metrics`

mod config;
mod logging;
mod metrics;
mod register;
mod views;

use std::sync::Arc;
use std::time::Duration;

use accumulator::{Accumulator, spawn_poll_task};
use anyhow::{Context, Result};
use ecobee_api::EcobeeClient;
use ecobee_auth::{AuthorizingTransport, PersistentTokenStore, SystemClock, TokenStore};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::views::{AppState, build_router};

/// How long in-flight HTTP requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on waiting for the poll cycle in flight at shutdown.
const POLL_STOP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // CLI: optional `register` subcommand and a --config flag
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());
    let command = args
        .iter()
        .skip(1)
        .find(|a| !a.starts_with("--") && Some(a.as_str()) != cli_config_path)
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    let config = Config::load(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("failed to load config from {}", path.display()),
        None => "failed to load config".to_string(),
    })?;

    // The HTTP exchange log location comes from config, so tracing starts here
    logging::init(config.ecobee.http_log.as_deref())?;
    match &config_path {
        Some(path) => info!(path = %path.display(), "loaded configuration"),
        None => info!("no configuration file, using defaults and environment"),
    }

    match command {
        None => serve(config).await,
        Some("register") => register::run(&config).await,
        Some(other) => anyhow::bail!("unknown command {other:?} (expected `register` or none)"),
    }
}

async fn serve(config: Config) -> Result<()> {
    info!(
        listen_addr = %config.server.listen_addr,
        api_host = %config.ecobee.api_host,
        poll_interval_secs = config.poll.interval_secs,
        http_log = ?config.ecobee.http_log,
        "starting promobee"
    );

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus = metrics::install_recorder().context("failed to install metrics recorder")?;

    let token_store = config.token_store()?.to_path_buf();
    let store = PersistentTokenStore::load(token_store.clone(), Arc::new(SystemClock))
        .await
        .with_context(|| format!("failed initializing token store {}", token_store.display()))?;
    if store.valid_for().num_seconds() < 0 {
        info!("stored access token has expired, it will be refreshed before the first poll");
    }

    let transport = AuthorizingTransport::new(
        Arc::new(store),
        reqwest::Client::new(),
        config.api_key()?.clone(),
        &config.ecobee.api_host,
    )
    .with_http_logging(config.ecobee.http_log.is_some());
    let client = EcobeeClient::new(transport, &config.ecobee.api_host);

    let accumulator = Arc::new(Accumulator::new(Arc::new(client)));
    let poller = spawn_poll_task(
        accumulator.clone(),
        Duration::from_secs(config.poll.interval_secs),
    );

    let app = build_router(
        AppState {
            accumulator,
            prometheus,
        },
        config.server.max_connections,
    );

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: notify the server to drain, then race it against the timer.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    // The poll cycle in flight completes before the loop exits
    if tokio::time::timeout(POLL_STOP_TIMEOUT, poller.stop())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = POLL_STOP_TIMEOUT.as_secs(),
            "poll cycle still running, abandoning it"
        );
    }

    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
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
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
