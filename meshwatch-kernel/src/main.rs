/**
 * MESHWATCH KERNEL - Polling daemon around the caching repo
 *
 * ROLE: Loads the config, opens the local snapshot repo, then refreshes the
 * all-connections view once per test update period and logs a health summary.
 * The cache is synchronous; every poll runs on the blocking pool.
 */

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use meshwatch_kernel::thresholds::HealthStatus;
use meshwatch_kernel::{load_config, CachingRepo, LocalFileRepo};

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let config = load_config().context("Failed to load config")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("meshwatch_kernel={}", config.logging_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("meshwatch kernel starting for test {}", config.test_id);

    let Some(snapshot_path) = config.snapshot_path.clone() else {
        bail!("snapshot_path is not configured, no repo to read from");
    };
    let repo = LocalFileRepo::open(&snapshot_path)
        .with_context(|| format!("Failed to open snapshot {}", snapshot_path.display()))?;
    let thresholds = config.health_thresholds().context("Invalid thresholds")?;

    let caching = Arc::new(CachingRepo::new(repo, config.test_id.clone(), config.cache_settings()));

    let mut ticker = interval(Duration::from_secs(u64::from(config.update_period_seconds)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                return Ok(());
            }
        }

        let poll = caching.clone();
        let mesh = match tokio::task::spawn_blocking(move || poll.get_mesh_results_all_connections()).await {
            Ok(mesh) => mesh,
            Err(e) => {
                error!("poll task failed: {}", e);
                continue;
            }
        };

        let mut critical = 0;
        for (from, column) in mesh.connection_matrix.connections() {
            let status = thresholds.status(from, &column.agent_id, column);
            if status == HealthStatus::Critical {
                debug!("{} -> {} is critical", from, column.agent_id);
                critical += 1;
            }
        }

        let health = caching.health();
        info!(
            "{} agents, {} connections with data, {} critical, {} fetches ({} failed)",
            health.agents, health.connections_with_data, critical, health.fetch_attempts, health.fetch_failures
        );
        if !health.populated {
            warn!("no mesh results cached yet");
        }
    }
}
