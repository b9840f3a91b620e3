//! token-guard entry point.
//!
//! Runs the forward-auth server by default; `issue`, `revoke`, and `list`
//! administer credentials against the same storage.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use token_guard::cli::{self, Cli, Command};
use token_guard::config::Config;
use token_guard::shutdown::{wait_for_signal, ShutdownCoordinator};
use token_guard::stats::{run_flusher, StatsAggregator};
use token_guard::storage::{RedisStorage, Storage};
use token_guard::validator::Validator;
use token_guard::http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("load configuration")?;

    match cli.command {
        None => serve(config).await,
        Some(Command::Issue(args)) => cli::issue(&config, args).await.map_err(Into::into),
        Some(Command::Revoke { key_id }) => cli::revoke(&config, key_id).await.map_err(Into::into),
        Some(Command::List) => cli::list(&config).await.map_err(Into::into),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let storage: Arc<dyn Storage> = Arc::new(
        RedisStorage::connect(&config.redis_url)
            .await
            .context("connect to redis")?,
    );

    let aggregator = Arc::new(StatsAggregator::new());
    let validator = Arc::new(Validator::new(
        storage.clone(),
        aggregator.clone(),
        config.cache_capacity,
        config.cache_ttl,
    ));

    let mut coordinator = ShutdownCoordinator::new();
    let flusher_signal = coordinator.subscribe();
    coordinator.spawn(
        "stats-flusher",
        run_flusher(
            aggregator,
            storage,
            config.stats_interval,
            flusher_signal,
        ),
    );

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;
    info!(addr = %config.bind, "token-guard listening");

    let app = http::router(validator, config.request_timeout);
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_signal())
        .await
        .context("auth server")?;

    // Server drained; stop background tasks, flushing pending stats.
    coordinator.shutdown(config.shutdown_timeout).await;
    info!("token-guard stopped");
    Ok(())
}
