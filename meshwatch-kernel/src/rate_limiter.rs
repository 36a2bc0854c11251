//! Minimum-interval gate in front of the upstream API.
//!
//! A stateful predicate, no timers: `check_and_update` answers whether enough time
//! went by since the last allowed call for a key, and records "now" if so.
//! Interval math uses the monotonic clock.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

pub struct RateLimiter<K = ()> {
    min_interval: Duration,
    last_allowed: Mutex<HashMap<K, Instant>>,
}

impl<K: Eq + Hash> RateLimiter<K> {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_allowed: Mutex::new(HashMap::new()),
        }
    }

    /// True if the interval since the last allowed call for `key` is exceeded.
    /// A zero interval never limits.
    pub fn check_and_update(&self, key: K) -> bool {
        self.check_and_update_at(key, Instant::now())
    }

    pub fn check_and_update_at(&self, key: K, now: Instant) -> bool {
        let mut last_allowed = self.last_allowed.lock();
        let allowed = match last_allowed.get(&key) {
            None => true,
            Some(_) if self.min_interval.is_zero() => true,
            Some(last) => now.saturating_duration_since(*last) > self.min_interval,
        };
        if allowed {
            last_allowed.insert(key, now);
        }
        allowed
    }

    pub fn interval(&self) -> Duration {
        self.min_interval
    }
}
