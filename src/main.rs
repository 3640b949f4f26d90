//! Retention Enforcement Node
//!
//! Periodically retires expired shard groups in metadata and removes their
//! shards from this node's storage.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use common::Configuration;
use common::cli::{CommonArgs, CommonCommands, utils};
use retention::{DirShardStore, InMemoryMetaClient, MetaClient, RetentionService, ShardStore};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<CommonCommands>,
}

/// Waits for a shutdown signal (SIGINT or SIGTERM)
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => tracing::info!("Received SIGINT"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        tracing::info!("Received Ctrl+C");
    }

    Ok(())
}

async fn build_meta_client(config: &Configuration) -> Result<InMemoryMetaClient> {
    let client = match &config.meta.snapshot_path {
        Some(path) => InMemoryMetaClient::from_snapshot_file(path)
            .await
            .with_context(|| format!("Failed to load metadata from {}", path.display()))?,
        None => {
            tracing::warn!("No metadata snapshot configured, starting with empty metadata");
            InMemoryMetaClient::new(Vec::new())
        }
    };

    Ok(match (&config.meta.snapshot_path, config.meta.persist) {
        (Some(path), true) => client.with_persist_path(path),
        _ => client,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = utils::load_config(args.common.config.as_ref())?;
    utils::init_logging(&args.common, &config.logging);

    let command = args.command.unwrap_or_default();
    if utils::handle_common_command(&command, &config)? {
        return Ok(());
    }
    utils::validate_config(&config)?;

    tracing::info!("Starting retention node");

    let meta: Arc<dyn MetaClient> = Arc::new(build_meta_client(&config).await?);
    let store: Arc<dyn ShardStore> = Arc::new(DirShardStore::new(&config.storage.data_dir));
    tracing::info!(
        data_dir = %config.storage.data_dir.display(),
        "Using local shard storage"
    );

    // Sweeps log through the subscriber installed by init_logging.
    let dispatch = tracing::dispatcher::get_default(|d| d.clone());
    let mut service =
        RetentionService::with_dispatch(config.retention.clone(), meta, store, dispatch);
    if !config.retention.enabled {
        tracing::info!("Retention enforcement disabled");
    }
    service.start();

    wait_for_shutdown_signal().await?;

    tracing::info!("Received shutdown signal, stopping retention service");
    service.stop().await;

    let metrics = service.metrics();
    tracing::info!(
        sweeps = metrics.sweeps(),
        shard_groups_deleted = metrics.shard_groups_deleted(),
        shards_deleted = metrics.shards_deleted(),
        "Retention node stopped"
    );

    Ok(())
}
