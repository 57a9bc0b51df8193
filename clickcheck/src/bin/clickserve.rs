//! Clickcheck receiver.
//!
//! Answers every request for a host starting with the configured prefix,
//! logging it and writing its form values to stdout as JSON.

use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clickcheck::config::DEFAULT_CONFIG_FILE;
use clickcheck::{create_router, AppState, Config, PrefixGate, RecordSink};

/// Receive and record clicks on tracking links
#[derive(Parser, Debug)]
#[command(name = "clickserve")]
#[command(version, about, long_about = None)]
struct Args {
    /// Alternate configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Structured JSON logging on stderr; stdout carries the click records
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_writer(std::io::stderr),
        )
        .init();

    info!("click_server_starting");

    let config = Config::load(&args.config).context("Failed to load configuration")?;
    if config.tls_configured() {
        bail!("TLS is not handled by clickserve; remove cert/key and terminate TLS in front of it");
    }
    let addr = config.listen_addr()?;

    info!(
        listen = %addr,
        host_prefix = %config.host_prefix,
        "config_loaded"
    );

    let state = AppState::new(PrefixGate::new(config.host_prefix.clone()), RecordSink::stdout());
    let app = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(address = %addr, "click_server_listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server exiting")?;

    info!("click_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("click_server_shutting_down");
}
