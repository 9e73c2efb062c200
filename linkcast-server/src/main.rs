//! linkcast-server - account linking and publishing endpoints
//!
//! Serves the authorization, callback and publish endpoints over HTTP.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use liblinkcast::config::resolve_config_path;
use liblinkcast::logging::{LogFormat, LoggingConfig};
use liblinkcast::{Config, LinkcastError, LinkcastService};
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "linkcast-server")]
#[command(version)]
#[command(about = "Link social accounts and publish posts to them")]
#[command(long_about = "\
linkcast-server - Link social accounts and publish posts to them

DESCRIPTION:
    linkcast-server runs the HTTP endpoints used to link LinkedIn and
    Discord accounts and to publish a post to every account it targets.

    Linking starts at /authorize, which redirects the browser to the
    provider. The provider sends the browser back to /callback, which
    stores the linked account and redirects to the configured page.

ENDPOINTS:
    GET    /authorize?provider=<tag>[&account_id=][&workspace_id=][&redirect_uri=]
    GET    /callback
    POST   /posts
    POST   /publish/<post_id>
    POST   /accounts
    POST   /accounts/<id>/disconnect
    DELETE /accounts/<id>
    GET    /health

USAGE:
    # Run with the default configuration
    linkcast-server

    # Listen on another address
    linkcast-server --bind 0.0.0.0:9000

    # JSON logs for log shippers
    linkcast-server --log-format json

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (in-flight requests finish)

CONFIGURATION:
    Configuration file: ~/.config/linkcast/config.toml
    Secrets may come from LINKCAST_LINKEDIN_CLIENT_SECRET and
    LINKCAST_STATE_SECRET instead of the file.

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "LINKCAST_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Log output format: text, json or pretty
    #[arg(long, env = "LINKCAST_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LINKCAST_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = LoggingConfig::new(cli.log_format, cli.log_level.clone(), cli.verbose).try_init() {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<LinkcastError>()
            .map(LinkcastError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => resolve_config_path()?,
    };
    let config = Config::load_from_path(&config_path)?;
    let bind = cli.bind.unwrap_or_else(|| config.server.bind.clone());

    let service = Arc::new(LinkcastService::from_config(&config).await?);
    let app = liblinkcast::http::router(service.clone());

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;

    info!(
        address = %bind,
        providers = ?service.providers(),
        config = %config_path.display(),
        "linkcast-server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("linkcast-server stopped");
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM
#[cfg(unix)]
async fn shutdown_signal() {
    use futures::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            error!("Signal setup failed, falling back to Ctrl-C: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    if let Some(signal) = signals.next().await {
        info!(signal, "Received shutdown signal, stopping gracefully...");
    }
    signals.handle().close();
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received shutdown signal, stopping gracefully...");
}
