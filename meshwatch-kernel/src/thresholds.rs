/**
 * THRESHOLDS - Connection health classification
 *
 * ROLE: Per-metric "deteriorated" / "failed" limits, with optional per agent pair
 * overrides, and the classification of a connection's latest measurement into
 * Healthy / Warning / Critical / NoData.
 *
 * CONFIG (yaml):
 *   latency:
 *     defaults: { deteriorated: 200, failed: 400 }
 *     overrides:
 *       - { from: "10", to: "11", deteriorated: 10, failed: 20 }
 */

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::ConfigError;
use crate::models::{MeshColumn, MetricType};
use crate::types::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdLimits {
    pub deteriorated: f64,
    pub failed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOverride {
    pub from: AgentId,
    pub to: AgentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deteriorated: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<f64>,
}

/// Thresholds section of one metric, as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    pub defaults: ThresholdLimits,
    #[serde(default)]
    pub overrides: Vec<ThresholdOverride>,
}

impl ThresholdsConfig {
    pub fn new(deteriorated: f64, failed: f64) -> Self {
        Self {
            defaults: ThresholdLimits { deteriorated, failed },
            overrides: Vec::new(),
        }
    }
}

/// Validated thresholds of one metric
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    defaults: ThresholdLimits,
    overrides: HashMap<(AgentId, AgentId), ThresholdLimits>,
}

impl Thresholds {
    pub fn from_config(metric: MetricType, config: &ThresholdsConfig) -> Result<Self, ConfigError> {
        validate(metric, "defaults", &config.defaults)?;

        let mut overrides = HashMap::new();
        for o in &config.overrides {
            let limits = ThresholdLimits {
                deteriorated: o.deteriorated.unwrap_or(config.defaults.deteriorated),
                failed: o.failed.unwrap_or(config.defaults.failed),
            };
            validate(metric, &format!("{} -> {}", o.from, o.to), &limits)?;
            overrides.insert((o.from.clone(), o.to.clone()), limits);
        }

        Ok(Self {
            defaults: config.defaults,
            overrides,
        })
    }

    pub fn deteriorated(&self, from: &AgentId, to: &AgentId) -> f64 {
        self.limits(from, to).deteriorated
    }

    pub fn failed(&self, from: &AgentId, to: &AgentId) -> f64 {
        self.limits(from, to).failed
    }

    fn limits(&self, from: &AgentId, to: &AgentId) -> ThresholdLimits {
        self.overrides
            .get(&(from.clone(), to.clone()))
            .copied()
            .unwrap_or(self.defaults)
    }

    fn status(&self, from: &AgentId, to: &AgentId, value: f64) -> HealthStatus {
        if value.is_nan() {
            return HealthStatus::Healthy;
        }
        let limits = self.limits(from, to);
        if value >= limits.failed {
            HealthStatus::Critical
        } else if value >= limits.deteriorated {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

fn validate(metric: MetricType, scope: &str, limits: &ThresholdLimits) -> Result<(), ConfigError> {
    if limits.deteriorated > limits.failed || limits.deteriorated.is_nan() || limits.failed.is_nan() {
        return Err(ConfigError::InvalidThresholds(format!(
            "{} {}: deteriorated ({}) must not exceed failed ({})",
            metric, scope, limits.deteriorated, limits.failed
        )));
    }
    Ok(())
}

/// Ordered from best to worst, so `max` picks the worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    NoData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthThresholds {
    pub latency: Thresholds,
    pub jitter: Thresholds,
    pub packet_loss: Thresholds,
}

impl HealthThresholds {
    pub fn get(&self, metric: MetricType) -> &Thresholds {
        match metric {
            MetricType::Latency => &self.latency,
            MetricType::Jitter => &self.jitter,
            MetricType::PacketLoss => &self.packet_loss,
        }
    }

    /// Classifies the latest measurement of the `from` -> `to` connection
    pub fn status(&self, from: &AgentId, to: &AgentId, column: &MeshColumn) -> HealthStatus {
        let Some(latest) = column.latest_measurement() else {
            return HealthStatus::NoData;
        };
        if latest.is_total_loss() {
            return HealthStatus::Critical;
        }
        MetricType::ALL
            .iter()
            .map(|metric| self.get(*metric).status(from, to, latest.value(*metric)))
            .max()
            .unwrap_or(HealthStatus::Healthy)
    }

    /// Status of one metric alone, for per-metric views
    pub fn metric_status(&self, from: &AgentId, to: &AgentId, column: &MeshColumn, metric: MetricType) -> HealthStatus {
        match column.latest_measurement() {
            None => HealthStatus::NoData,
            Some(latest) if latest.is_total_loss() => HealthStatus::Critical,
            Some(latest) => self.get(metric).status(from, to, latest.value(metric)),
        }
    }
}
