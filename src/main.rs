use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use futures::future::{join_all, try_join_all};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use channel_server::config::{
    parse_duration, ServerConfig, SubscriptionConfig, DEFAULT_LISTEN_ADDRESS, DEFAULT_URL,
};
use channel_server::source::HttpFetcher;
use channel_server::subscription::Subscription;
use channel_server::{api, rollout};

#[derive(Parser)]
#[command(name = "channelserver")]
#[command(about = "Serves release channel metadata with staged per-client rollouts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the channel server (default)
    Serve,
    /// Load every subscription once, print what would be served and exit
    Check,
}

#[derive(Args)]
struct Options {
    /// Source document URL or local path; later sources override earlier ones
    #[arg(long = "url", env = "URL", value_delimiter = ',', default_value = DEFAULT_URL, global = true)]
    urls: Vec<String>,

    /// Subscription key; each key is served under its own path prefix
    #[arg(long = "config-key", env = "SUBKEY", value_delimiter = ',', global = true)]
    config_keys: Vec<String>,

    /// How often sources are re-fetched (e.g. 15m, 1h30m)
    #[arg(long, env = "REFRESH_INTERVAL", default_value = "15m", value_parser = parse_duration, global = true)]
    refresh_interval: Duration,

    /// Upper bound for a single source fetch
    #[arg(long, env = "FETCH_TIMEOUT", default_value = "30s", value_parser = parse_duration, global = true)]
    fetch_timeout: Duration,

    /// Address the HTTP API listens on
    #[arg(long, env = "LISTEN_ADDRESS", default_value = DEFAULT_LISTEN_ADDRESS, global = true)]
    listen_address: SocketAddr,

    /// Version tag reported to clients and used for rollout version bounds
    #[arg(long, env = "CHANNEL_SERVER_VERSION", default_value = "", global = true)]
    channel_server_version: String,
}

impl Options {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            listen_address: self.listen_address,
            keys: self.config_keys,
            urls: self.urls,
            refresh_interval: self.refresh_interval,
            fetch_timeout: self.fetch_timeout,
            server_version: self.channel_server_version,
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "channel_server=info,channelserver=info,tower_http=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = cli.options.into_config();
    config.validate()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Check => check(config).await,
    }
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    tracing::info!(
        keys = ?config.keys,
        urls = ?config.urls,
        refresh_interval = ?config.refresh_interval,
        server_version = %config.server_version,
        "Starting channel server"
    );

    let subscriptions = try_join_all(config.subscriptions().into_iter().map(initialize)).await?;

    let shutdown = CancellationToken::new();
    let refresh_loops: Vec<_> = subscriptions
        .iter()
        .map(|sub| sub.spawn(shutdown.clone()))
        .collect();

    let app = api::create_router(subscriptions);
    let listener = tokio::net::TcpListener::bind(config.listen_address).await?;
    tracing::info!(
        "Channel server listening on http://{}",
        config.listen_address
    );

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let server_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await?;

    // Also reached when the server exits on its own.
    shutdown.cancel();
    join_all(refresh_loops).await;
    tracing::info!("Channel server stopped");

    Ok(())
}

async fn check(config: ServerConfig) -> anyhow::Result<()> {
    let mut failed = 0;

    for sub_config in config.subscriptions() {
        let key = sub_config.key.clone();
        match initialize(sub_config).await {
            Ok(sub) => print_summary(&sub),
            Err(e) => {
                failed += 1;
                println!("{key}: FAILED\n  {e:#}");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} subscription(s) could not be loaded");
    }
    Ok(())
}

async fn initialize(config: SubscriptionConfig) -> anyhow::Result<Arc<Subscription>> {
    let key = config.key.clone();
    let fetcher = Arc::new(
        HttpFetcher::new(config.fetch_timeout).context("failed to build HTTP client")?,
    );

    Subscription::initialize(config, fetcher)
        .await
        .with_context(|| format!("failed to load initial snapshot for {key}"))
}

fn print_summary(sub: &Subscription) {
    let snapshot = sub.current();
    println!(
        "{}: {} channel(s), {} release(s) from {} source(s)",
        sub.key(),
        snapshot.channel_count(),
        snapshot.release_count(),
        snapshot.source_count()
    );

    for channel in snapshot.list_channels() {
        println!("  {} -> {}", channel.name, channel.latest);
        let mut lower = 0u64;
        for rule in &channel.rollouts {
            let upper = lower + u64::from(rule.percentage);
            println!(
                "    buckets [{lower}, {upper}) of {} -> {}{}",
                rollout::BUCKETS,
                rule.release,
                if rule.active { "" } else { " (inactive)" }
            );
            lower = upper;
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
