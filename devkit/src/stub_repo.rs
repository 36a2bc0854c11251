/*!
Scripted Repo for tests without an upstream API

Replies are queued in order; once the queue is drained the fallback reply is
served, or a transport error when there is none. Every query is recorded.
*/

use meshwatch_kernel::models::{MeshConfig, MeshResults};
use meshwatch_kernel::ports::{MeshResultsQuery, Repo, RepoError};
use meshwatch_kernel::types::TestId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Reply {
    Results(MeshResults),
    Failure(String),
}

#[derive(Default)]
struct StubState {
    replies: VecDeque<Reply>,
    fallback: Option<MeshResults>,
    config: Option<MeshConfig>,
    queries: Vec<MeshResultsQuery>,
}

/// Cloneable handle; clones share the script and the query log
#[derive(Clone, Default)]
pub struct StubRepo {
    state: Arc<Mutex<StubState>>,
}

impl StubRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same reply to every query
    pub fn serving(results: MeshResults) -> Self {
        let stub = Self::new();
        stub.set_fallback(results);
        stub
    }

    pub fn push_results(&self, results: MeshResults) -> &Self {
        self.state.lock().replies.push_back(Reply::Results(results));
        self
    }

    pub fn push_failure(&self, message: &str) -> &Self {
        self.state.lock().replies.push_back(Reply::Failure(message.to_string()));
        self
    }

    pub fn set_fallback(&self, results: MeshResults) {
        self.state.lock().fallback = Some(results);
    }

    pub fn clear_fallback(&self) {
        self.state.lock().fallback = None;
    }

    pub fn set_config(&self, config: MeshConfig) {
        self.state.lock().config = Some(config);
    }

    pub fn queries(&self) -> Vec<MeshResultsQuery> {
        self.state.lock().queries.clone()
    }

    pub fn last_query(&self) -> Option<MeshResultsQuery> {
        self.state.lock().queries.last().cloned()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().queries.len()
    }

    pub fn pending_replies(&self) -> usize {
        self.state.lock().replies.len()
    }

    pub fn clear(&self) {
        *self.state.lock() = StubState::default();
    }
}

impl Repo for StubRepo {
    fn get_mesh_config(&self, test_id: &TestId) -> Result<MeshConfig, RepoError> {
        self.state
            .lock()
            .config
            .clone()
            .ok_or_else(|| RepoError::TestNotFound(test_id.clone()))
    }

    fn get_mesh_test_results(&self, query: &MeshResultsQuery) -> Result<MeshResults, RepoError> {
        let mut state = self.state.lock();
        state.queries.push(query.clone());
        tracing::debug!("stub repo query #{}: {:?}", state.queries.len(), query);

        match state.replies.pop_front() {
            Some(Reply::Results(results)) => Ok(results),
            Some(Reply::Failure(message)) => Err(RepoError::Transport(message)),
            None => state
                .fallback
                .clone()
                .ok_or_else(|| RepoError::Transport("stub repo script exhausted".into())),
        }
    }
}
