//! One from->to connection: its health time series and the metrics it carries.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use time::{Duration, OffsetDateTime};

use crate::types::AgentId;

/// Available mesh test metric types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Latency,
    Jitter,
    PacketLoss,
}

impl MetricType {
    pub const ALL: [MetricType; 3] = [MetricType::Latency, MetricType::Jitter, MetricType::PacketLoss];

    pub fn unit(&self) -> &'static str {
        match self {
            MetricType::Latency | MetricType::Jitter => "ms",
            MetricType::PacketLoss => "%",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MetricType::Latency => "Latency[ms]",
            MetricType::Jitter => "Jitter[ms]",
            MetricType::PacketLoss => "Packet loss[%]",
        };
        f.write_str(label)
    }
}

/// Single from->to connection health observation.
///
/// A fully lost sample (100 % packet loss) carries no latency or jitter: both are NaN.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "HealthRecord")]
pub struct HealthItem {
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    #[serde(with = "nan_as_null")]
    latency_ms: f64,
    #[serde(with = "nan_as_null")]
    jitter_ms: f64,
    packet_loss_pct: f64,
}

#[derive(Deserialize)]
struct HealthRecord {
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    #[serde(default = "nan", with = "nan_as_null")]
    latency_ms: f64,
    #[serde(default = "nan", with = "nan_as_null")]
    jitter_ms: f64,
    packet_loss_pct: f64,
}

fn nan() -> f64 {
    f64::NAN
}

impl From<HealthRecord> for HealthItem {
    fn from(record: HealthRecord) -> Self {
        HealthItem::new(record.timestamp, record.latency_ms, record.jitter_ms, record.packet_loss_pct)
    }
}

impl HealthItem {
    pub fn new(timestamp: OffsetDateTime, latency_ms: f64, jitter_ms: f64, packet_loss_pct: f64) -> Self {
        let (latency_ms, jitter_ms) = if packet_loss_pct >= 100.0 {
            (f64::NAN, f64::NAN)
        } else {
            (latency_ms, jitter_ms)
        };
        Self {
            timestamp,
            latency_ms,
            jitter_ms,
            packet_loss_pct,
        }
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency_ms
    }

    pub fn jitter_ms(&self) -> f64 {
        self.jitter_ms
    }

    pub fn packet_loss_pct(&self) -> f64 {
        self.packet_loss_pct
    }

    pub fn value(&self, metric: MetricType) -> f64 {
        match metric {
            MetricType::Latency => self.latency_ms(),
            MetricType::Jitter => self.jitter_ms(),
            MetricType::PacketLoss => self.packet_loss_pct(),
        }
    }

    pub fn is_total_loss(&self) -> bool {
        self.packet_loss_pct() >= 100.0
    }
}

fn same_value(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

// NaN marks "no sample" here, so two lost samples compare equal
impl PartialEq for HealthItem {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp() == other.timestamp()
            && same_value(self.latency_ms(), other.latency_ms())
            && same_value(self.jitter_ms(), other.jitter_ms())
            && same_value(self.packet_loss_pct(), other.packet_loss_pct())
    }
}

mod nan_as_null {
    use super::*;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// Connection "to" endpoint: the time series measured towards `agent_id`.
///
/// `health` is kept sorted newest-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ColumnRecord")]
pub struct MeshColumn {
    pub agent_id: AgentId,
    health: Vec<HealthItem>,
}

#[derive(Deserialize)]
struct ColumnRecord {
    agent_id: AgentId,
    #[serde(default)]
    health: Vec<HealthItem>,
}

impl From<ColumnRecord> for MeshColumn {
    fn from(record: ColumnRecord) -> Self {
        MeshColumn::new(record.agent_id, record.health)
    }
}

impl MeshColumn {
    pub fn new(agent_id: impl Into<AgentId>, mut health: Vec<HealthItem>) -> Self {
        health.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        Self {
            agent_id: agent_id.into(),
            health,
        }
    }

    pub fn empty(agent_id: impl Into<AgentId>) -> Self {
        Self::new(agent_id, Vec::new())
    }

    pub fn health(&self) -> &[HealthItem] {
        &self.health
    }

    pub fn latest_measurement(&self) -> Option<&HealthItem> {
        self.health.first()
    }

    pub fn oldest_measurement(&self) -> Option<&HealthItem> {
        self.health.last()
    }

    pub fn has_data(&self) -> bool {
        !self.health.is_empty()
    }

    pub fn len(&self) -> usize {
        self.health.len()
    }

    pub fn is_empty(&self) -> bool {
        self.health.is_empty()
    }

    /// Time covered between the oldest and newest retained samples
    pub fn retained_span(&self) -> Duration {
        match (self.latest_measurement(), self.oldest_measurement()) {
            (Some(newest), Some(oldest)) => newest.timestamp() - oldest.timestamp(),
            _ => Duration::ZERO,
        }
    }

    /// Appends the items of `older` that predate this column's oldest sample.
    /// Newest-first order is preserved and no timestamp appears twice.
    pub(crate) fn extend_history_from(&mut self, older: &MeshColumn) {
        let Some(cutoff) = self.oldest_measurement().map(|h| h.timestamp()) else {
            return;
        };
        let start = older.health.partition_point(|h| h.timestamp() >= cutoff);
        self.health.extend_from_slice(&older.health[start..]);
    }

    /// Keeps samples at or after `since`
    pub(crate) fn retain_since(&mut self, since: OffsetDateTime) {
        self.health.retain(|h| h.timestamp() >= since);
    }

    /// Keeps only the latest sample
    pub(crate) fn truncate_to_latest(&mut self) {
        self.health.truncate(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_total_loss_has_no_latency_or_jitter() {
        let item = HealthItem::new(datetime!(2024-01-01 0:00 UTC), 12.0, 3.0, 100.0);
        assert!(item.latency_ms().is_nan());
        assert!(item.jitter_ms().is_nan());
        assert!(item.is_total_loss());
        assert_eq!(item, item);
    }

    #[test]
    fn test_column_sorted_newest_first() {
        let t0 = datetime!(2024-01-01 0:00 UTC);
        let col = MeshColumn::new(
            "2",
            vec![
                HealthItem::new(t0, 1.0, 0.1, 0.0),
                HealthItem::new(t0 + Duration::minutes(2), 3.0, 0.3, 0.0),
                HealthItem::new(t0 + Duration::minutes(1), 2.0, 0.2, 0.0),
            ],
        );
        assert_eq!(col.latest_measurement().unwrap().latency_ms(), 3.0);
        assert_eq!(col.oldest_measurement().unwrap().latency_ms(), 1.0);
        assert_eq!(col.retained_span(), Duration::minutes(2));
        assert!(col.has_data());
        assert!(!MeshColumn::empty("3").has_data());
    }

    #[test]
    fn test_extend_history_only_takes_strictly_older() {
        let t0 = datetime!(2024-01-01 0:00 UTC);
        let at = |m: i64| HealthItem::new(t0 + Duration::minutes(m), m as f64, 0.0, 0.0);
        let older = MeshColumn::new("2", vec![at(0), at(1), at(2), at(3)]);
        let mut fresh = MeshColumn::new("2", vec![at(2), at(3), at(4)]);

        fresh.extend_history_from(&older);

        let minutes: Vec<f64> = fresh.health().iter().map(|h| h.latency_ms()).collect();
        assert_eq!(minutes, vec![4.0, 3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_nan_round_trips_through_json_as_null() {
        let item = HealthItem::new(datetime!(2024-01-01 0:00 UTC), 0.0, 0.0, 100.0);
        let json = serde_json::to_value(item).unwrap();
        assert!(json["latency_ms"].is_null());
        let back: HealthItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_total_loss_from_json_drops_reported_latency() {
        let json = serde_json::json!({
            "timestamp": "2024-03-01T12:00:00Z",
            "latency_ms": 12.0,
            "jitter_ms": 3.0,
            "packet_loss_pct": 100.0,
        });

        let item: HealthItem = serde_json::from_value(json).unwrap();

        assert!(item.is_total_loss());
        assert!(item.latency_ms().is_nan());
        assert!(item.jitter_ms().is_nan());
        assert!(item.value(MetricType::Latency).is_nan());
        assert_eq!(item.value(MetricType::PacketLoss), 100.0);
    }

    #[test]
    fn test_metric_units_and_labels() {
        let units: Vec<&str> = MetricType::ALL.iter().map(|m| m.unit()).collect();
        assert_eq!(units, vec!["ms", "ms", "%"]);
        assert_eq!(MetricType::PacketLoss.to_string(), "Packet loss[%]");
    }
}
