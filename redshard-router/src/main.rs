//! Redshard Node - Main entry point
//!
//! Watches the range config file, keeps the routing table and the
//! per-endpoint connection pools in line with it, and shuts the pools down
//! gracefully on Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use redshard_router::{
    watch_channel, ConfigReconciler, ConfigWatch, ConnectionPoolManager, FileWatch, NodeConfig,
    ShardRouter, TcpConnector,
};

const STATUS_INTERVAL: Duration = Duration::from_secs(30);
const RECONCILER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NodeConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║                Redshard Node Starting                      ║");
    info!("╠════════════════════════════════════════════════════════════╣");
    info!("║  Ranges:     {:^44} ║", config.ranges_path.display());
    info!("║  Poll:       {:^44} ║", format!("{:?}", config.poll_interval));
    info!("║  Pool size:  {:^44} ║", config.pool_max_size);
    info!("║  Drain:      {:^44} ║", format!("{:?}", config.drain_grace));
    info!("╚════════════════════════════════════════════════════════════╝");

    let router = Arc::new(ShardRouter::new());
    let pools = Arc::new(ConnectionPoolManager::new(
        TcpConnector::default(),
        config.pool_config(),
    ));
    let reconciler = Arc::new(ConfigReconciler::new(router.clone(), pools.clone()));

    let (on_change, events) = watch_channel();
    let reconciler_handle = {
        let reconciler = reconciler.clone();
        tokio::spawn(async move { reconciler.run(events).await })
    };

    let ranges_path = config.ranges_path.to_string_lossy().into_owned();
    let subscription = FileWatch::new(config.poll_interval)
        .subscribe(&ranges_path, on_change)
        .await?;

    if !router.is_ready() {
        info!("Waiting for a valid range table at {}", ranges_path);
    }

    let mut status = tokio::time::interval(STATUS_INTERVAL);
    let mut table_check = tokio::time::interval(config.poll_interval);
    let mut logged_generation = 0;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = table_check.tick() => {
                let generation = router.generation();
                if generation != logged_generation {
                    logged_generation = generation;
                    match serde_json::to_string(&router.list_ranges()) {
                        Ok(ranges) => info!(generation, %ranges, "Routing table"),
                        Err(e) => warn!("Failed to serialize routing table: {}", e),
                    }
                }
            }
            _ = status.tick() => {
                let pool_stats = pools.stats();
                let reconcile_stats = reconciler.stats();
                info!(
                    generation = router.generation(),
                    ranges = router.list_ranges().len(),
                    active_pools = pool_stats.active_pools,
                    retiring_pools = pool_stats.retiring_pools,
                    applied = reconcile_stats.applied,
                    rejected = reconcile_stats.rejected,
                    "Router status"
                );
            }
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
        }
    }

    info!("Shutting down");
    subscription.cancel();
    if tokio::time::timeout(RECONCILER_STOP_TIMEOUT, reconciler_handle)
        .await
        .is_err()
    {
        warn!("Reconciler did not stop within {:?}", RECONCILER_STOP_TIMEOUT);
    }
    pools.shutdown().await;
    info!("Redshard node stopped");

    Ok(())
}
