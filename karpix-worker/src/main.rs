//! Karpix Worker
//!
//! Entry point: load configuration, connect to Redis, register handlers and
//! consume the configured queue until interrupted.

use std::sync::Arc;

use anyhow::Context;
use karpix_job_queue::{HandlerRegistry, RedisQueue};
use karpix_worker::{TaskRunner, Worker};
use tokio::sync::watch;

mod cli;
mod config_helpers;
mod tracing_setup;

use cli::CliArgs;
use config_helpers::{notifier_from_config, poll_interval_from_config, status_logger_from_config};
use tracing_setup::install_tracing_from_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    if args.help_requested {
        CliArgs::print_help();
        return Ok(());
    }

    // Resolve config path: CLI > environment variable
    let config_path = args
        .config_path
        .or_else(|| std::env::var("KARPIX_CONFIG_PATH").ok());

    let mut config = load_config(config_path.as_deref())?;
    if args.burst {
        config.worker.burst = true;
    }
    karpix_config::validate_config(&config).context("invalid configuration")?;

    install_tracing_from_config(&config.logging);
    tracing::info!(
        config_path = config_path.as_deref().unwrap_or("-"),
        queue = %config.worker.queue_name,
        key_prefix = %config.redis.key_prefix,
        build_number = %config.build_number,
        "karpix worker starting"
    );

    let registry = HandlerRegistry::new();
    karpix_handlers::register_all_handlers(&registry).await;
    tracing::info!(handlers = registry.len().await, "handlers registered");

    let notifier = notifier_from_config(&config).context("failed to build webhook client")?;
    let runner = TaskRunner::new(
        registry,
        status_logger_from_config(&config),
        Arc::new(notifier),
        config.build_number.clone(),
    );

    let queue = RedisQueue::connect(
        &config.redis.url,
        config.redis.key_prefix.clone(),
        config.worker.queue_name.clone(),
    )
    .await
    .context("failed to connect to redis")?;

    let requeued = queue
        .requeue_orphans()
        .await
        .context("failed to requeue interrupted jobs")?;
    if requeued > 0 {
        tracing::warn!(requeued, "requeued jobs left in progress by a previous worker");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received, finishing current job");
        let _ = shutdown_tx.send(true);
    });

    let stats = Worker::new(runner, Arc::new(queue))
        .poll_interval(poll_interval_from_config(&config))
        .burst(config.worker.burst)
        .run(shutdown_rx)
        .await;

    tracing::info!(
        processed = stats.processed,
        succeeded = stats.succeeded,
        failed = stats.failed,
        queue_errors = stats.queue_errors,
        "karpix worker exiting"
    );
    Ok(())
}

/// Load configuration from file or defaults.
fn load_config(path: Option<&str>) -> anyhow::Result<karpix_config::Config> {
    karpix_config::load_config(path).map_err(|e| {
        eprintln!("failed to load configuration: {e}");
        anyhow::anyhow!(e.to_string())
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(error) => {
            tracing::warn!(%error, "SIGTERM handler unavailable, listening for ctrl-c only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
