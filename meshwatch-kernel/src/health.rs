use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

use crate::models::MeshResults;

/// Health report of one caching controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHealth {
    pub uptime_seconds: u64,
    pub fetch_attempts: u64,
    pub fetch_failures: u64,
    pub rate_limited: u64,
    pub full_updates: u64,
    pub incremental_updates: u64,
    pub populated: bool,
    pub agents: u64,
    pub connections_with_data: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub timestamp_oldest: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub timestamp_newest: Option<OffsetDateTime>,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    fetch_attempts: AtomicU64,
    fetch_failures: AtomicU64,
    rate_limited: AtomicU64,
    full_updates: AtomicU64,
    incremental_updates: AtomicU64,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn mark_fetch_attempt(&self) {
        self.counters.fetch_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_fetch_failure(&self) {
        self.counters.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_rate_limited(&self) {
        self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_full_update(&self) {
        self.counters.full_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_incremental_update(&self) {
        self.counters.incremental_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_health(&self, mesh: &MeshResults) -> CacheHealth {
        let counters = &self.counters;
        let full_updates = counters.full_updates.load(Ordering::Relaxed);
        CacheHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            fetch_attempts: counters.fetch_attempts.load(Ordering::Relaxed),
            fetch_failures: counters.fetch_failures.load(Ordering::Relaxed),
            rate_limited: counters.rate_limited.load(Ordering::Relaxed),
            full_updates,
            incremental_updates: counters.incremental_updates.load(Ordering::Relaxed),
            populated: full_updates > 0 || !mesh.is_empty(),
            agents: u64::try_from(mesh.agents.len()).unwrap_or(u64::MAX),
            connections_with_data: u64::try_from(mesh.num_connections_with_data()).unwrap_or(u64::MAX),
            timestamp_oldest: mesh.timestamp_oldest(),
            timestamp_newest: mesh.timestamp_newest(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
