//! sockspipe - SOCKS5 proxy server
//!
//! Thin CLI over [`sockspipe::Server`]: loads a TOML config, applies flag
//! overrides, and serves until interrupted.

use anyhow::Result;
use clap::Parser;
use sockspipe::auth::PasswordAuth;
use sockspipe::config::{load_config, Config};
use sockspipe::Server;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// sockspipe - SOCKS5 proxy server
#[derive(Parser, Debug)]
#[command(name = "sockspipe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level, args.json_log)?;

    let config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            info!("configuration loaded from {:?}", path);
            config
        }
        None => Config::default(),
    };
    config.server.validate().map_err(|e| anyhow::anyhow!(e))?;

    let listen = args.listen.unwrap_or_else(|| config.server.listen.clone());

    let mut server = Server::new(listen)
        .with_timeout(Duration::from_secs(config.server.timeout_secs))
        .with_udp_buffer(config.server.udp_buffer);
    if let Some((user, pass)) = config.server.credentials() {
        server = server.with_auth(Arc::new(PasswordAuth::new(user, pass)));
    }

    info!("sockspipe v{}", sockspipe::VERSION);

    // close the server on ctrl-c or SIGTERM
    let closer = server.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("received ctrl-c, shutting down");
        }

        closer.close();
    });

    server.listen_and_serve().await?;
    Ok(())
}

/// Install the global tracing subscriber
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
