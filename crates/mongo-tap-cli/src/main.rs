//! mongo-tap CLI
//!
//! A transparent TCP proxy for the MongoDB wire protocol that decodes and
//! logs every message it forwards, without touching the proxied bytes.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mongo_tap_core::config::{LoggingConfig, ProxyConfig};
use mongo_tap_core::proxy::ProxyListener;
use mongo_tap_core::sniff::TracingSink;

/// Transparent MongoDB wire-protocol sniffing proxy.
#[derive(Parser)]
#[command(name = "mongo-tap")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listen endpoint, e.g. ":7017" or "127.0.0.1:7017".
    #[arg(short = 'l', long = "listen")]
    listen: Option<String>,

    /// Upstream MongoDB address.
    #[arg(short = 'd', long = "upstream")]
    upstream: Option<String>,

    /// Path to configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<String>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration; the proxy runs on defaults with no file at all.
    let mut config = match &args.config {
        Some(path) => ProxyConfig::from_file(path)?,
        None => ProxyConfig::default(),
    };

    // Apply CLI overrides
    if let Some(listen) = args.listen {
        config.listen.address = listen;
    }
    if let Some(upstream) = args.upstream {
        config.upstream.address = upstream;
    }
    config.validate()?;

    // Override log level from verbosity flag
    let log_config = match args.verbose {
        0 => config.logging.clone(),
        1 => LoggingConfig {
            level: "debug".to_string(),
            ..config.logging.clone()
        },
        _ => LoggingConfig {
            level: "trace".to_string(),
            ..config.logging.clone()
        },
    };

    // Setup tracing
    setup_tracing(&log_config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listen.bind_address(),
        upstream = %config.upstream.dial_address(),
        "starting mongo-tap"
    );

    // Run the async runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move { run_proxy(config).await })
}

fn setup_tracing(config: &LoggingConfig) {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }
}

async fn run_proxy(config: ProxyConfig) -> anyhow::Result<()> {
    let listener = ProxyListener::new(config, Arc::new(TracingSink));
    let shutdown_handle = listener.shutdown_handle();

    // Handle shutdown signals
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, stopping proxy");
        let _ = shutdown_handle.send(());
    });

    // Run the proxy; bind failure propagates as a nonzero exit.
    listener.run().await?;

    info!("proxy shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
