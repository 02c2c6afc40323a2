use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter};

use statuswatch::config::Config;
use statuswatch::events::EVENT_CHANNEL_CAPACITY;
use statuswatch::feed::FeedClient;
use statuswatch::health;
use statuswatch::monitor::IncidentCounter;
use statuswatch::notifier::{self, ConsoleNotifier};
use statuswatch::tracker::Tracker;

#[derive(Parser, Debug)]
#[command(
    name = "statuswatch",
    version,
    about = "Watches provider status pages and reports new or updated incidents"
)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, short, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    /// Port for the liveness endpoint
    #[arg(long, env = "PORT", default_value_t = health::DEFAULT_PORT)]
    port: u16,

    /// Don't start the liveness endpoint
    #[arg(long)]
    no_health: bool,
}

/// Cancels `cancel` on SIGINT or SIGTERM (Ctrl-C elsewhere).
async fn shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, listening for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise start at info and switch to the configured
    // level once the config file has been read.
    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok());
    let filter_from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if !filter_from_env {
        match EnvFilter::try_new(&config.settings.log_level) {
            Ok(level) => filter_handle
                .reload(level)
                .context("Failed to apply configured log level")?,
            Err(e) => tracing::warn!(
                log_level = %config.settings.log_level,
                error = %e,
                "Invalid log_level in config, keeping info"
            ),
        }
    }
    let heartbeat = tracing::enabled!(tracing::Level::DEBUG);

    let cancel = CancellationToken::new();
    let counter = Arc::new(IncidentCounter::new());
    let client = FeedClient::new().context("Failed to build HTTP client")?;
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let mut console = ConsoleNotifier::new(std::io::stdout(), heartbeat);
    console.banner()?;
    let printer = tokio::spawn(notifier::run(rx, heartbeat));

    let health_server = if args.no_health {
        None
    } else {
        let listener = health::bind(args.port)
            .await
            .with_context(|| format!("Failed to bind health endpoint on port {}", args.port))?;
        Some(tokio::spawn(health::serve(
            listener,
            Arc::clone(&counter),
            cancel.clone(),
        )))
    };

    tokio::spawn(shutdown_signal(cancel.clone()));

    Tracker::new(config, client, counter, tx)
        .run(cancel.clone())
        .await;
    cancel.cancel();

    if let Some(server) = health_server {
        match server.await {
            Ok(Err(e)) => tracing::warn!(error = %e, "Health endpoint failed"),
            Err(e) => tracing::warn!(error = %e, "Health endpoint task failed"),
            Ok(Ok(())) => {}
        }
    }

    // Every sender is gone once the tracker returns, so this drains and ends.
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Notifier task failed");
    }
    console.shutdown()?;

    Ok(())
}
