use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::cache::CacheSettings;
use crate::models::MetricType;
use crate::thresholds::{HealthThresholds, Thresholds, ThresholdsConfig};
use crate::types::TestId;

pub const CONFIG_ENV: &str = "MESHWATCH_CONFIG";
pub const TEST_ID_ENV: &str = "MESHWATCH_TEST_ID";
pub const DEFAULT_CONFIG_PATH: &str = "meshwatch.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdsSection {
    #[serde(default = "default_latency")]
    pub latency: ThresholdsConfig,
    #[serde(default = "default_jitter")]
    pub jitter: ThresholdsConfig,
    #[serde(default = "default_packet_loss")]
    pub packet_loss: ThresholdsConfig,
}

impl Default for ThresholdsSection {
    fn default() -> Self {
        Self {
            latency: default_latency(),
            jitter: default_jitter(),
            packet_loss: default_packet_loss(),
        }
    }
}

fn default_latency() -> ThresholdsConfig {
    ThresholdsConfig::new(200.0, 400.0)
}

fn default_jitter() -> ThresholdsConfig {
    ThresholdsConfig::new(20.0, 40.0)
}

fn default_packet_loss() -> ThresholdsConfig {
    ThresholdsConfig::new(1.0, 10.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub test_id: TestId,
    /// minimum interval between two upstream requests, in test update periods
    #[serde(default = "default_request_interval_periods")]
    pub data_request_interval_periods: u32,
    /// lookback of single-connection requests, in test update periods
    #[serde(default = "default_history_length_periods")]
    pub data_history_length_periods: u32,
    /// lookback of all-connections requests, in test update periods
    #[serde(default = "default_min_periods")]
    pub data_min_periods: u32,
    #[serde(default = "default_max_age_periods")]
    pub data_max_age_periods: u32,
    /// used until the test configuration is known
    #[serde(default = "default_update_period_seconds")]
    pub update_period_seconds: u32,
    #[serde(default = "default_logging_level")]
    pub logging_level: String,
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    #[serde(default)]
    pub thresholds: ThresholdsSection,
}

fn default_request_interval_periods() -> u32 {
    1
}

fn default_history_length_periods() -> u32 {
    60
}

fn default_min_periods() -> u32 {
    2
}

fn default_max_age_periods() -> u32 {
    1
}

fn default_update_period_seconds() -> u32 {
    60
}

fn default_logging_level() -> String {
    "info".into()
}

impl Config {
    /// Default settings for the given test
    pub fn with_test_id(test_id: TestId) -> Self {
        Self {
            test_id,
            data_request_interval_periods: default_request_interval_periods(),
            data_history_length_periods: default_history_length_periods(),
            data_min_periods: default_min_periods(),
            data_max_age_periods: default_max_age_periods(),
            update_period_seconds: default_update_period_seconds(),
            logging_level: default_logging_level(),
            snapshot_path: None,
            thresholds: ThresholdsSection::default(),
        }
    }

    pub fn from_yaml(txt: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(txt)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.test_id.as_str().is_empty() {
            return Err(ConfigError::Invalid("test_id must not be empty".into()));
        }
        if self.update_period_seconds == 0 {
            return Err(ConfigError::Invalid("update_period_seconds must be positive".into()));
        }
        if self.data_min_periods == 0 || self.data_history_length_periods == 0 {
            return Err(ConfigError::Invalid(
                "data_min_periods and data_history_length_periods must be positive".into(),
            ));
        }
        self.health_thresholds()?;
        Ok(())
    }

    pub fn cache_settings(&self) -> CacheSettings {
        let period = self.update_period_seconds;
        CacheSettings {
            max_data_age_seconds: self.data_max_age_periods.saturating_mul(period),
            request_interval_seconds: self.data_request_interval_periods.saturating_mul(period),
            history_length_seconds: self.data_history_length_periods.saturating_mul(period),
            min_lookback_periods: self.data_min_periods,
        }
    }

    pub fn health_thresholds(&self) -> Result<HealthThresholds, ConfigError> {
        let t = &self.thresholds;
        Ok(HealthThresholds {
            latency: Thresholds::from_config(MetricType::Latency, &t.latency)?,
            jitter: Thresholds::from_config(MetricType::Jitter, &t.jitter)?,
            packet_loss: Thresholds::from_config(MetricType::PacketLoss, &t.packet_loss)?,
        })
    }
}

pub fn load_config_from<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let txt = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Config::from_yaml(&txt)
}

/// Reads the file named by `MESHWATCH_CONFIG` (default `meshwatch.yaml`).
/// Only an absent file falls back to defaults, for the test in `MESHWATCH_TEST_ID`.
pub fn load_config() -> Result<Config, ConfigError> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    if Path::new(&path).exists() {
        return load_config_from(&path);
    }
    match std::env::var(TEST_ID_ENV) {
        Ok(test_id) if !test_id.is_empty() => {
            warn!("no {} found, using default config", path);
            Ok(Config::with_test_id(TestId::new(test_id)))
        }
        _ => Err(ConfigError::Invalid(format!(
            "no {} found and {} is not set",
            path, TEST_ID_ENV
        ))),
    }
}
