/*!
Test harness for caching scenarios

Wires a CachingRepo to a StubRepo and checks how many upstream fetches a
scenario triggered.
*/

use anyhow::Result;
use meshwatch_kernel::cache::{CacheSettings, CachingRepo};
use meshwatch_kernel::health::CacheHealth;
use meshwatch_kernel::models::MeshResults;
use meshwatch_kernel::types::AgentId;
use tracing::info;

use crate::stub_repo::StubRepo;

/// Settings where every read goes upstream: no max age, no rate limit
pub fn eager_settings() -> CacheSettings {
    CacheSettings {
        max_data_age_seconds: 0,
        request_interval_seconds: 0,
        history_length_seconds: 3600,
        min_lookback_periods: 2,
    }
}

/// Installs a test subscriber once; honors RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct TestHarness {
    pub repo: StubRepo,
    pub caching: CachingRepo<StubRepo>,
    expected_fetches: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct TestStats {
    pub upstream_calls: usize,
    pub pending_replies: usize,
    pub health: CacheHealth,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(eager_settings())
    }

    pub fn with_settings(settings: CacheSettings) -> Self {
        init_tracing();
        let repo = StubRepo::new();
        let caching = CachingRepo::new(repo.clone(), "test-1".into(), settings);
        Self {
            repo,
            caching,
            expected_fetches: None,
        }
    }

    /// Queues `results` as the next upstream reply
    pub fn reply(&self, results: MeshResults) -> &Self {
        self.repo.push_results(results);
        self
    }

    pub fn fail(&self, message: &str) -> &Self {
        self.repo.push_failure(message);
        self
    }

    pub fn all(&self) -> MeshResults {
        self.caching.get_mesh_results_all_connections()
    }

    pub fn single(&self, from: &str, to: &str) -> MeshResults {
        self.caching
            .get_mesh_results_single_connection(&AgentId::from(from), &AgentId::from(to))
    }

    /// Total upstream calls the scenario is expected to make
    pub fn expect_fetches(&mut self, count: usize) -> &mut Self {
        self.expected_fetches = Some(count);
        self
    }

    pub fn verify_expectations(&self) -> Result<()> {
        if let Some(expected) = self.expected_fetches {
            let actual = self.repo.call_count();
            if actual != expected {
                anyhow::bail!("expected {} upstream calls, got {}", expected, actual);
            }
            info!("{} upstream calls as expected", actual);
        }
        if self.repo.pending_replies() > 0 {
            anyhow::bail!("{} scripted replies never consumed", self.repo.pending_replies());
        }
        Ok(())
    }

    pub fn get_stats(&self) -> TestStats {
        TestStats {
            upstream_calls: self.repo.call_count(),
            pending_replies: self.repo.pending_replies(),
            health: self.caching.health(),
        }
    }

    /// Forgets the script and the query log; the cache itself is kept
    pub fn reset(&mut self) {
        self.repo.clear();
        self.expected_fetches = None;
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
