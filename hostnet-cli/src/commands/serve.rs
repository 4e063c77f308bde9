//! Serve command implementation

use anyhow::{Context, Result};
use hostnet_core::DriverConfig;
use hostnet_driver::{
    run_supervised, Coordinator, DevicePolicy, DevicePublisher, JsonLinesSource,
    NetlinkDeviceSource, NetlinkRelocator, SnapshotSink,
};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cli::ServeArgs;

pub async fn execute(args: ServeArgs) -> Result<()> {
    let config = load_config(&args)?;
    let node_name = resolve_node_name(&config)?;

    tracing::info!(
        driver = %config.driver_name,
        node = %node_name,
        publish_interval_secs = config.publish_interval_secs,
        "Starting hostnet driver"
    );

    let cancel = CancellationToken::new();
    let coordinator = Coordinator::new(Arc::new(NetlinkRelocator::new()));

    let publisher = DevicePublisher::new(
        Arc::new(NetlinkDeviceSource),
        Arc::new(SnapshotSink::new()),
        node_name,
    )
    .with_policy(DevicePolicy::from_config(&config))
    .with_interval(config.publish_interval());

    let publisher_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { publisher.run(cancel).await })
    };

    let mut supervisor: Option<JoinHandle<hostnet_core::Result<()>>> =
        match config.events_path.clone() {
            Some(path) => {
                let source = JsonLinesSource::new(path, coordinator.clone());
                let policy = config.restart;
                let cancel = cancel.clone();
                Some(tokio::spawn(async move {
                    run_supervised(&source, &policy, cancel).await
                }))
            }
            None => {
                tracing::warn!("No lifecycle feed configured, only publishing devices");
                None
            }
        };

    let outcome = tokio::select! {
        res = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            res
        }
        res = wait_for(&mut supervisor) => res,
    };

    cancel.cancel();
    publisher_task.await.context("Publisher task failed")?;
    if supervisor.is_some() {
        wait_for(&mut supervisor).await?;
    }

    tracing::info!(workloads = coordinator.store().len(), "Hostnet driver stopped");
    outcome
}

fn load_config(args: &ServeArgs) -> Result<DriverConfig> {
    let mut config = match &args.config {
        Some(path) => DriverConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => DriverConfig::new(),
    };

    if let Some(node_name) = &args.node_name {
        config = config.with_node_name(node_name.clone());
    }
    if let Some(events) = &args.events {
        config = config.with_events_path(events.clone());
    }
    if let Some(secs) = args.publish_interval {
        config = config.with_publish_interval(secs);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn resolve_node_name(config: &DriverConfig) -> Result<String> {
    if let Some(name) = &config.node_name {
        return Ok(name.clone());
    }

    nix::unistd::gethostname()
        .context("Failed to read hostname")?
        .into_string()
        .map_err(|_| anyhow::anyhow!("Hostname is not valid UTF-8"))
}

/// Await the supervisor, or never complete when there is none
async fn wait_for(task: &mut Option<JoinHandle<hostnet_core::Result<()>>>) -> Result<()> {
    let Some(handle) = task.as_mut() else {
        return std::future::pending().await;
    };

    let res = handle.await;
    *task = None;
    res.context("Supervisor task failed")?
        .context("Lifecycle feed could not be kept running")
}

async fn shutdown_signal() -> Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("Failed to listen for Ctrl+C")?,
        _ = terminate.recv() => {}
    }

    Ok(())
}
