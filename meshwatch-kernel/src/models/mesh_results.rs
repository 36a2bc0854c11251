/**
 * MESH RESULTS - Aggregate root of one mesh test snapshot
 *
 * ROLE: Tasks + Agents registries and the ConnectionMatrix, as fetched from a repo
 * or as held by the cache. Built fresh on every upstream fetch; the cached
 * instance is merged into incrementally as long as the agent set is unchanged.
 *
 * READ SIDE: connection() / filter() are total, missing data is None or empty.
 */

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::agents::Agents;
use super::connection::{MeshColumn, MetricType};
use super::matrix::{ConnectionMatrix, ConnectionUpdatePolicy, SplicePolicy};
use super::tasks::Tasks;
use crate::types::{AgentId, TaskId};

/// Refused merge. The rejected update is handed back so the caller can
/// still use it as a full replacement.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("agent sets differ (cached: {cached} agents, incoming: {incoming} agents), full update required")]
    AgentsMismatch {
        cached: usize,
        incoming: usize,
        rejected: Box<MeshResults>,
    },
}

/// Agent list and update period of a mesh test
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshConfig {
    pub agents: Agents,
    pub update_period_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshResults {
    #[serde(with = "time::serde::rfc3339")]
    pub utc_timestamp: OffsetDateTime,
    #[serde(default)]
    pub tasks: Tasks,
    #[serde(default)]
    pub agents: Agents,
    #[serde(default)]
    pub connection_matrix: ConnectionMatrix,
}

impl Default for MeshResults {
    fn default() -> Self {
        Self {
            utc_timestamp: OffsetDateTime::UNIX_EPOCH,
            tasks: Tasks::default(),
            agents: Agents::default(),
            connection_matrix: ConnectionMatrix::default(),
        }
    }
}

impl MeshResults {
    pub fn new(agents: Agents, tasks: Tasks, connection_matrix: ConnectionMatrix) -> Self {
        Self {
            utc_timestamp: OffsetDateTime::now_utc(),
            tasks,
            agents,
            connection_matrix,
        }
    }

    /// Nothing fetched into this instance yet
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty() && self.connection_matrix.num_connections() == 0
    }

    pub fn same_agents(&self, other: &MeshResults) -> bool {
        self.agents.same_agents(&other.agents)
    }

    /// Merges `src` into self, keeping history and anything `src` does not carry.
    /// Fails without touching self when the agent sets differ.
    pub fn incremental_update(&mut self, src: MeshResults) -> Result<(), MergeError> {
        self.incremental_update_with(src, &SplicePolicy)
    }

    pub fn incremental_update_with(
        &mut self,
        src: MeshResults,
        policy: &dyn ConnectionUpdatePolicy,
    ) -> Result<(), MergeError> {
        if !self.same_agents(&src) {
            return Err(MergeError::AgentsMismatch {
                cached: self.agents.len(),
                incoming: src.agents.len(),
                rejected: Box::new(src),
            });
        }

        self.tasks.union(&src.tasks);
        self.agents.update_names_aliases(&src.agents);
        self.connection_matrix
            .incremental_update(src.connection_matrix, policy);
        self.utc_timestamp = OffsetDateTime::now_utc();
        Ok(())
    }

    pub fn connection(&self, from: &AgentId, to: &AgentId) -> Option<&MeshColumn> {
        self.connection_matrix.connection(from, to)
    }

    /// Same as `connection`, with an empty record standing in for a missing one
    pub fn connection_or_empty(&self, from: &AgentId, to: &AgentId) -> MeshColumn {
        self.connection(from, to)
            .cloned()
            .unwrap_or_else(|| MeshColumn::empty(to.clone()))
    }

    /// (timestamp, value) series of one metric, newest first
    pub fn filter(&self, from: &AgentId, to: &AgentId, metric: MetricType) -> Vec<(OffsetDateTime, f64)> {
        self.connection(from, to)
            .map(|c| c.health().iter().map(|h| (h.timestamp(), h.value(metric))).collect())
            .unwrap_or_default()
    }

    /// Task measuring connections towards `agent`, resolved through the agent's IP
    pub fn agent_id_to_task_id(&self, agent: &AgentId) -> Option<TaskId> {
        let agent = self.agents.get_by_id(agent)?;
        self.tasks.get_by_ip(&agent.ip).map(|t| t.id.clone())
    }

    pub fn max_test_period_seconds(&self) -> Option<u32> {
        self.tasks.max_period_seconds()
    }

    pub fn num_connections_with_data(&self) -> usize {
        self.connection_matrix.num_connections_with_data()
    }

    pub fn timestamp_oldest(&self) -> Option<OffsetDateTime> {
        self.connection_matrix.timestamp_oldest()
    }

    pub fn timestamp_newest(&self) -> Option<OffsetDateTime> {
        self.connection_matrix.timestamp_newest()
    }

    pub fn config(&self) -> MeshConfig {
        MeshConfig {
            agents: self.agents.clone(),
            update_period_seconds: self.max_test_period_seconds().unwrap_or_default(),
        }
    }
}
