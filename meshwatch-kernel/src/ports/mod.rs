/**
 * REPO PORT - Data access to mesh test configuration and results
 *
 * ROLE:
 * The Repo trait is the one capability the cache consumes. Implementations wrap
 * the upstream HTTP API client (outside this crate), a local JSON snapshot
 * (`localfile`), or a scripted stub in tests.
 *
 * - MeshResultsQuery = filters of one results request (agents, tasks, lookback)
 * - RepoError = transport/API/IO failures; the cache absorbs them and serves stale data
 *
 * Implementations own their request timeouts.
 */

pub mod localfile;

use crate::models::{MeshConfig, MeshResults};
use crate::types::{AgentId, TaskId, TestId};

/// Errors a repo may signal; retryable by the caller on the next cycle
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Test not found: {0}")]
    TestNotFound(TestId),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One results request. Empty `agent_ids` / `task_ids` mean "no filter".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshResultsQuery {
    pub test_id: TestId,
    /// keep connections outgoing from these agents
    pub agent_ids: Vec<AgentId>,
    /// keep connections targeting the agents measured by these tasks
    pub task_ids: Vec<TaskId>,
    pub history_length_seconds: u32,
    /// false = latest sample per connection only
    pub timeseries: bool,
}

impl MeshResultsQuery {
    /// Every connection, no filter
    pub fn all(test_id: TestId, history_length_seconds: u32, timeseries: bool) -> Self {
        Self {
            test_id,
            agent_ids: Vec::new(),
            task_ids: Vec::new(),
            history_length_seconds,
            timeseries,
        }
    }

    pub fn with_agents(mut self, agent_ids: Vec<AgentId>) -> Self {
        self.agent_ids = agent_ids;
        self
    }

    pub fn with_tasks(mut self, task_ids: Vec<TaskId>) -> Self {
        self.task_ids = task_ids;
        self
    }
}

/// Interface every mesh data source implements
pub trait Repo: Send + Sync {
    fn get_mesh_config(&self, test_id: &TestId) -> Result<MeshConfig, RepoError>;

    fn get_mesh_test_results(&self, query: &MeshResultsQuery) -> Result<MeshResults, RepoError>;
}

impl<R: Repo + ?Sized> Repo for std::sync::Arc<R> {
    fn get_mesh_config(&self, test_id: &TestId) -> Result<MeshConfig, RepoError> {
        (**self).get_mesh_config(test_id)
    }

    fn get_mesh_test_results(&self, query: &MeshResultsQuery) -> Result<MeshResults, RepoError> {
        (**self).get_mesh_test_results(query)
    }
}

pub use localfile::LocalFileRepo;
