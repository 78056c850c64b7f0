//! Core data models for the replica autoscaler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// CPU usage across the target workload
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuUsage {
    pub total_mcores: f64,
    pub per_pod_mcores: f64,
}

/// Memory usage across the target workload
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total_bytes: f64,
    pub per_pod_bytes: f64,
    pub total_mb: f64,
    pub per_pod_mb: f64,
}

/// Cluster-wide network throughput rates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkIo {
    pub in_bps: f64,
    pub out_bps: f64,
    pub in_mbps: f64,
    pub out_mbps: f64,
}

/// One observation of the target workload, produced each cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub timestamp: DateTime<Utc>,
    pub pod_count: u32,
    pub cpu: CpuUsage,
    pub memory: MemoryUsage,
    pub network: NetworkIo,
}

/// A single point from a range query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    /// Unix timestamp in seconds
    pub timestamp: i64,
    pub value: f64,
}

/// Ordered series of one metric over a lookback window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub points: Vec<SamplePoint>,
}

impl HistoricalSeries {
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Which metric a range query targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoricalMetric {
    /// Total CPU rate across the workload, in millicores
    Cpu,
    /// Total working-set memory across the workload, in MB
    Memory,
}

impl HistoricalMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoricalMetric::Cpu => "cpu",
            HistoricalMetric::Memory => "memory",
        }
    }
}

/// Per-axis utilization scores, each bounded to [0, 100]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub cpu_score: f64,
    pub memory_score: f64,
    pub network_score: f64,
    pub cost_score: f64,
    /// Weighted combination of the four axis scores
    pub total_score: f64,
}

/// Direction of a scaling action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleAction {
    ScaleUp,
    ScaleDown,
    NoChange,
}

impl ScaleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleAction::ScaleUp => "scale_up",
            ScaleAction::ScaleDown => "scale_down",
            ScaleAction::NoChange => "no_change",
        }
    }
}

impl std::fmt::Display for ScaleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which estimator produced the chosen replica target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    RuleBased,
    MlModel,
}

impl std::fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionSource::RuleBased => f.write_str("rule-based"),
            DecisionSource::MlModel => f.write_str("ml"),
        }
    }
}

/// Outcome of one decision cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub current_replicas: i32,
    pub target_replicas: i32,
    /// Fused estimate before dampening
    pub optimal_replicas: i32,
    pub rule_based_replicas: i32,
    pub ml_replicas: Option<i32>,
    /// Agreement across the model's estimators, zero when untrained
    pub ml_confidence: f64,
    pub decision_source: DecisionSource,
    pub action: ScaleAction,
    pub should_scale: bool,
    pub reason: String,
    pub scores: Scores,
    /// Overall confidence in the decision, in [0, 1]
    pub confidence: f64,
}

/// Shape of a metric's recent history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPattern {
    Increasing,
    Decreasing,
    Stable,
    #[default]
    Unknown,
}

impl LoadPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadPattern::Increasing => "increasing",
            LoadPattern::Decreasing => "decreasing",
            LoadPattern::Stable => "stable",
            LoadPattern::Unknown => "unknown",
        }
    }
}

/// Fixed feature record derived from one metrics snapshot plus history.
///
/// Every field is always present; on insufficient history the rolling,
/// trend, and pattern groups are zeroed and patterns are `Unknown`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    // Current state
    pub pod_count: f64,
    /// Millicores per pod
    pub cpu_current: f64,
    /// Millicores across all pods
    pub cpu_total: f64,
    /// MB per pod
    pub memory_current: f64,
    /// MB across all pods
    pub memory_total: f64,
    pub network_in_rate: f64,
    pub network_out_rate: f64,
    pub network_total: f64,
    pub cpu_per_pod_ratio: f64,
    pub memory_per_pod_ratio: f64,

    // Rolling statistics over the 15-minute window
    pub cpu_avg_15m: f64,
    pub cpu_max_15m: f64,
    pub cpu_min_15m: f64,
    pub cpu_std_15m: f64,
    pub cpu_avg_1h: f64,
    pub cpu_volatility: f64,
    pub memory_avg_15m: f64,
    pub memory_max_15m: f64,
    pub memory_min_15m: f64,
    pub memory_std_15m: f64,
    pub memory_avg_1h: f64,
    pub memory_volatility: f64,

    // Calendar
    pub hour_of_day: u32,
    pub day_of_week: u32,
    pub is_business_hours: bool,
    pub is_weekend: bool,
    pub is_peak_hour: bool,
    pub hour_sin: f64,
    pub hour_cos: f64,
    pub day_sin: f64,
    pub day_cos: f64,

    // Trend
    /// OLS slope per sample over the last 60 range samples
    pub cpu_trend: f64,
    /// R² of the linear fit, in [0, 1]
    pub cpu_trend_strength: f64,
    pub cpu_rate_of_change: f64,
    pub memory_trend: f64,
    pub memory_trend_strength: f64,
    pub memory_rate_of_change: f64,

    // Pattern
    pub cpu_pattern: LoadPattern,
    pub cpu_is_increasing: bool,
    pub cpu_is_stable: bool,
    pub cpu_is_decreasing: bool,
    pub memory_pattern: LoadPattern,
    pub memory_is_increasing: bool,
    pub memory_is_stable: bool,
    pub memory_is_decreasing: bool,
}

/// Record of one successful actuation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleEvent {
    pub timestamp: DateTime<Utc>,
    pub replicas: i32,
}

/// Per-cycle record retained in the bounded metrics history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub timestamp: DateTime<Utc>,
    pub replicas: i32,
    pub decision: Decision,
    pub features: FeatureVector,
}
