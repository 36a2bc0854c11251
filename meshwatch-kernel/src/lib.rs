//! Meshwatch kernel - cached, incrementally merged view of mesh test results
//!
//! - `models`: agents, tasks, connection time series, the connection matrix and
//!   the MeshResults aggregate with its merge algebra
//! - `ports`: the Repo data-access trait and a local JSON snapshot repo
//! - `cache`: the request-driven CachingRepo, its update policies and rate limiting
//! - `thresholds`: connection health classification
//! - `config`: YAML configuration

pub mod cache;
pub mod config;
pub mod health;
pub mod models;
pub mod ports;
pub mod rate_limiter;
pub mod thresholds;
pub mod types;

pub use cache::{CacheSettings, CachingRepo};
pub use config::{load_config, load_config_from, Config, ConfigError};
pub use health::{CacheHealth, HealthTracker};
pub use models::{MeshConfig, MeshResults, MergeError};
pub use ports::{LocalFileRepo, MeshResultsQuery, Repo, RepoError};
pub use rate_limiter::RateLimiter;
pub use thresholds::{HealthStatus, HealthThresholds};
pub use types::{AgentId, TaskId, TestId};
