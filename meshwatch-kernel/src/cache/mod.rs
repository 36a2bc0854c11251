/**
 * CACHING REPO - Request-driven cache in front of a mesh results Repo
 *
 * ROLE:
 * Serves MeshResults copies to readers and keeps the cached instance fresh.
 * Every read runs the same pipeline against an UpdatePolicy:
 *
 * 1. copy of the cache (under lock)
 * 2. need_update(copy, now) ? otherwise serve the copy
 * 3. rate limiter, per query shape ? otherwise serve the copy
 * 4. fetch from the repo, outside the lock
 * 5. merge (same agents) or replace (configuration changed), under lock
 *
 * Upstream errors are logged and absorbed: the caller gets the last good data.
 * Configuration lookups on an empty cache go through the same limiter (own key).
 */

pub mod cached_mesh;
pub mod policy;

pub use cached_mesh::{CacheUpdate, CachedMeshResults};
pub use policy::{
    AllConnectionsPolicy, MinimumLookback, RateKey, SingleConnectionPolicy, UpdatePolicy,
    DEFAULT_UPDATE_PERIOD_SECONDS,
};

use std::time::Duration as StdDuration;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::health::{CacheHealth, HealthTracker};
use crate::models::{MeshConfig, MeshResults};
use crate::ports::Repo;
use crate::rate_limiter::RateLimiter;
use crate::types::{AgentId, TestId};

/// Timing knobs of a CachingRepo, all in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// cached samples older than this trigger a refresh
    pub max_data_age_seconds: u32,
    /// minimum time between two upstream requests of the same shape
    pub request_interval_seconds: u32,
    /// lookback of single-connection requests
    pub history_length_seconds: u32,
    /// all-connections lookback, in test update periods
    pub min_lookback_periods: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_data_age_seconds: 60,
            request_interval_seconds: 60,
            history_length_seconds: 3600,
            min_lookback_periods: 2,
        }
    }
}

pub struct CachingRepo<R: Repo> {
    repo: R,
    test_id: TestId,
    settings: CacheSettings,
    cache: CachedMeshResults,
    rate_limiter: RateLimiter<RateKey>,
    tracker: HealthTracker,
}

impl<R: Repo> CachingRepo<R> {
    pub fn new(repo: R, test_id: TestId, settings: CacheSettings) -> Self {
        info!(
            "caching repo for test {}: max age {}s, request interval {}s, history {}s",
            test_id,
            settings.max_data_age_seconds,
            settings.request_interval_seconds,
            settings.history_length_seconds
        );
        Self {
            repo,
            test_id,
            settings,
            cache: CachedMeshResults::new(),
            rate_limiter: RateLimiter::new(StdDuration::from_secs(u64::from(
                settings.request_interval_seconds,
            ))),
            tracker: HealthTracker::new(),
        }
    }

    pub fn test_id(&self) -> &TestId {
        &self.test_id
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Latest samples of every connection
    pub fn get_mesh_results_all_connections(&self) -> MeshResults {
        let policy = AllConnectionsPolicy {
            lookback: MinimumLookback {
                test_id: self.test_id.clone(),
                full_history_seconds: self.settings.history_length_seconds,
                periods: self.settings.min_lookback_periods,
            },
            max_data_age: self.max_data_age(),
        };
        self.get_or_update(&policy)
    }

    /// Full history window of the `from` -> `to` connection, plus everything
    /// else already cached
    pub fn get_mesh_results_single_connection(&self, from: &AgentId, to: &AgentId) -> MeshResults {
        let policy = SingleConnectionPolicy {
            test_id: self.test_id.clone(),
            from: from.clone(),
            to: to.clone(),
            full_history_seconds: self.settings.history_length_seconds,
            max_data_age: self.max_data_age(),
        };
        self.get_or_update(&policy)
    }

    /// Cached configuration when populated, the repo's otherwise.
    /// Repo lookups share the rate limiter and the health counters with data fetches.
    pub fn get_mesh_config(&self) -> MeshConfig {
        let cached = self.cache.inspect(|mesh| (!mesh.agents.is_empty()).then(|| mesh.config()));
        if let Some(config) = cached {
            return config;
        }

        if !self.rate_limiter.check_and_update(RateKey::Config) {
            debug!("mesh config: rate limited, serving default");
            self.tracker.mark_rate_limited();
            return MeshConfig::default();
        }

        self.tracker.mark_fetch_attempt();
        match self.repo.get_mesh_config(&self.test_id) {
            Ok(config) => config,
            Err(e) => {
                warn!("failed to fetch mesh config for test {}: {}", self.test_id, e);
                self.tracker.mark_fetch_failure();
                MeshConfig::default()
            }
        }
    }

    pub fn health(&self) -> CacheHealth {
        self.cache.inspect(|mesh| self.tracker.get_health(mesh))
    }

    fn max_data_age(&self) -> Duration {
        Duration::seconds(i64::from(self.settings.max_data_age_seconds))
    }

    fn get_or_update(&self, policy: &dyn UpdatePolicy) -> MeshResults {
        let cached = self.cache.get_copy();

        if !policy.need_update(&cached, OffsetDateTime::now_utc()) {
            debug!("{}: cache is fresh", policy.name());
            return cached;
        }

        if !self.rate_limiter.check_and_update(policy.rate_key()) {
            debug!("{}: rate limited, serving cached data", policy.name());
            self.tracker.mark_rate_limited();
            return cached;
        }

        self.tracker.mark_fetch_attempt();
        let update = match policy.get_update(&self.repo, &cached) {
            Ok(update) => update,
            Err(e) => {
                warn!("{}: failed to fetch mesh results: {}", policy.name(), e);
                self.tracker.mark_fetch_failure();
                return cached;
            }
        };

        match self.cache.update_with(update) {
            CacheUpdate::Incremental => self.tracker.mark_incremental_update(),
            CacheUpdate::Full => self.tracker.mark_full_update(),
        }
        self.cache.get_copy()
    }
}
