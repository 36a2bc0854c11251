//! Update policies: for one query shape, whether the cache needs a refresh and
//! how to fetch it.

use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::models::MeshResults;
use crate::ports::{MeshResultsQuery, Repo, RepoError};
use crate::types::{AgentId, TestId};

/// Test update period assumed until the task configuration is known
pub const DEFAULT_UPDATE_PERIOD_SECONDS: u32 = 60;

/// Rate limiter key of a query shape
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateKey {
    AllConnections,
    Connection(AgentId, AgentId),
    Config,
}

pub trait UpdatePolicy {
    fn name(&self) -> &'static str;

    fn rate_key(&self) -> RateKey;

    /// Freshness is derived here, never stored
    fn need_update(&self, mesh: &MeshResults, now: OffsetDateTime) -> bool;

    fn get_update(&self, repo: &dyn Repo, mesh: &MeshResults) -> Result<MeshResults, RepoError>;
}

/// Lookback short enough to keep payloads small, long enough that every
/// connection, even the slowest-updating one, has at least one sample in it
pub struct MinimumLookback {
    pub test_id: TestId,
    pub full_history_seconds: u32,
    pub periods: u32,
}

impl MinimumLookback {
    pub fn seconds(&self, repo: &dyn Repo, mesh: &MeshResults) -> Result<u32, RepoError> {
        if let Some(period) = mesh.max_test_period_seconds() {
            debug!("got maximum test period config from cache: {}s", period);
            return Ok(period.saturating_mul(self.periods));
        }

        // first time only: no task configuration cached yet
        let query = MeshResultsQuery::all(self.test_id.clone(), self.full_history_seconds, false);
        let results = repo.get_mesh_test_results(&query)?;
        if let Some(period) = results.max_test_period_seconds() {
            debug!("got maximum test period config from server: {}s", period);
            return Ok(period.saturating_mul(self.periods));
        }

        warn!(
            "test update period config not available, using default of {}s",
            DEFAULT_UPDATE_PERIOD_SECONDS
        );
        Ok(DEFAULT_UPDATE_PERIOD_SECONDS.saturating_mul(self.periods))
    }
}

/// Every connection, latest samples only
pub struct AllConnectionsPolicy {
    pub lookback: MinimumLookback,
    pub max_data_age: Duration,
}

impl UpdatePolicy for AllConnectionsPolicy {
    fn name(&self) -> &'static str {
        "AllConnectionsPolicy"
    }

    fn rate_key(&self) -> RateKey {
        RateKey::AllConnections
    }

    fn need_update(&self, mesh: &MeshResults, now: OffsetDateTime) -> bool {
        match mesh.timestamp_oldest() {
            Some(oldest) => oldest < now - self.max_data_age,
            None => true,
        }
    }

    fn get_update(&self, repo: &dyn Repo, mesh: &MeshResults) -> Result<MeshResults, RepoError> {
        let history = self.lookback.seconds(repo, mesh)?;
        debug!("history: {}s", history);
        let query = MeshResultsQuery::all(self.lookback.test_id.clone(), history, true);
        repo.get_mesh_test_results(&query)
    }
}

/// One from->to connection with its full history window
pub struct SingleConnectionPolicy {
    pub test_id: TestId,
    pub from: AgentId,
    pub to: AgentId,
    pub full_history_seconds: u32,
    pub max_data_age: Duration,
}

impl UpdatePolicy for SingleConnectionPolicy {
    fn name(&self) -> &'static str {
        "SingleConnectionPolicy"
    }

    fn rate_key(&self) -> RateKey {
        RateKey::Connection(self.from.clone(), self.to.clone())
    }

    fn need_update(&self, mesh: &MeshResults, now: OffsetDateTime) -> bool {
        let Some(connection) = mesh.connection(&self.from, &self.to) else {
            return true;
        };
        let Some(latest) = connection.latest_measurement() else {
            return true;
        };
        if latest.timestamp() < now - self.max_data_age {
            return true;
        }
        // shallow history left by an all-connections poll
        let wanted = Duration::seconds(i64::from(self.full_history_seconds)) - self.max_data_age;
        connection.retained_span() < wanted
    }

    fn get_update(&self, repo: &dyn Repo, mesh: &MeshResults) -> Result<MeshResults, RepoError> {
        debug!("history: {}s", self.full_history_seconds);
        let task_ids = match mesh.agent_id_to_task_id(&self.to) {
            Some(task_id) => vec![task_id],
            None => {
                debug!(
                    "task for agent '{}' not found, requesting entire mesh row",
                    self.to
                );
                Vec::new()
            }
        };
        let query = MeshResultsQuery::all(self.test_id.clone(), self.full_history_seconds, true)
            .with_agents(vec![self.from.clone()])
            .with_tasks(task_ids);
        repo.get_mesh_test_results(&query)
    }
}
