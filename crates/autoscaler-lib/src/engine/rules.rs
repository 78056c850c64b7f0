//! Deterministic utilization scoring and replica estimation
//!
//! Scores each resource axis against fixed per-pod targets, combines them
//! with configurable weights, and derives a rule-based optimal replica
//! count from current CPU and memory pressure.

use crate::models::{FeatureVector, Scores};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-pod CPU target, millicores
pub const TARGET_CPU_MCORES: f64 = 500.0;

/// Per-pod memory target, MB
pub const TARGET_MEMORY_MB: f64 = 512.0;

/// Workload network target, Mbps
pub const TARGET_NETWORK_MBPS: f64 = 10.0;

/// Below this per-pod CPU the estimator follows CPU alone, so idle
/// workloads can shed replicas that memory pressure would otherwise hold
const IDLE_CPU_PER_POD_MCORES: f64 = 10.0;

/// Scoring weights for the four resource axes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    #[serde(default = "default_cpu_weight")]
    pub cpu: f64,
    #[serde(default = "default_memory_weight")]
    pub memory: f64,
    #[serde(default = "default_network_weight")]
    pub network: f64,
    #[serde(default = "default_cost_weight")]
    pub cost: f64,
}

fn default_cpu_weight() -> f64 {
    0.40
}

fn default_memory_weight() -> f64 {
    0.30
}

fn default_network_weight() -> f64 {
    0.20
}

fn default_cost_weight() -> f64 {
    0.10
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            cpu: default_cpu_weight(),
            memory: default_memory_weight(),
            network: default_network_weight(),
            cost: default_cost_weight(),
        }
    }
}

impl Weights {
    /// Rescale so the weights sum to one; a non-positive sum falls back to
    /// the defaults
    pub fn normalized(self) -> Self {
        let sum = self.cpu + self.memory + self.network + self.cost;
        if sum <= 0.0 {
            return Self::default();
        }
        Self {
            cpu: self.cpu / sum,
            memory: self.memory / sum,
            network: self.network / sum,
            cost: self.cost / sum,
        }
    }
}

/// Rule-based estimator over one feature vector
#[derive(Debug, Clone)]
pub struct RuleEngine {
    weights: Weights,
    min_replicas: i32,
    max_replicas: i32,
}

impl RuleEngine {
    pub fn new(weights: Weights, min_replicas: i32, max_replicas: i32) -> Self {
        Self {
            weights: weights.normalized(),
            min_replicas,
            max_replicas,
        }
    }

    pub fn min_replicas(&self) -> i32 {
        self.min_replicas
    }

    pub fn max_replicas(&self) -> i32 {
        self.max_replicas
    }

    pub fn weights(&self) -> Weights {
        self.weights
    }

    /// Score each axis to [0, 100] and combine with the weights
    pub fn score(&self, features: &FeatureVector) -> Scores {
        let cpu_score = (features.cpu_current / TARGET_CPU_MCORES * 100.0).min(100.0);
        let memory_score = (features.memory_current / TARGET_MEMORY_MB * 100.0).min(100.0);
        let network_score = (features.network_total / TARGET_NETWORK_MBPS * 100.0).min(100.0);
        let cost_score =
            (100.0 - features.pod_count / self.max_replicas as f64 * 100.0).max(0.0);

        let total_score = cpu_score * self.weights.cpu
            + memory_score * self.weights.memory
            + network_score * self.weights.network
            + cost_score * self.weights.cost;

        Scores {
            cpu_score,
            memory_score,
            network_score,
            cost_score,
            total_score,
        }
    }

    /// Replica count that would bring per-pod CPU and memory to target,
    /// clamped into the configured range
    pub fn optimal_replicas(&self, features: &FeatureVector) -> i32 {
        let pod_count = features.pod_count as i32;

        let cpu_based = if features.cpu_current > 0.0 {
            (features.cpu_current * features.pod_count / TARGET_CPU_MCORES).ceil() as i32
        } else {
            pod_count
        };

        let memory_based = if features.memory_current > 0.0 {
            (features.memory_current * features.pod_count / TARGET_MEMORY_MB).ceil() as i32
        } else {
            pod_count
        };

        let cpu_per_pod = if pod_count > 0 {
            features.cpu_current / features.pod_count
        } else {
            features.cpu_current
        };

        let optimal = if cpu_per_pod < IDLE_CPU_PER_POD_MCORES {
            debug!(
                cpu_per_pod,
                cpu_based, "Very low CPU, using CPU-based replicas"
            );
            cpu_based
        } else {
            cpu_based.max(memory_based)
        };

        self.clamp_replicas(optimal)
    }

    pub fn clamp_replicas(&self, replicas: i32) -> i32 {
        replicas.clamp(self.min_replicas, self.max_replicas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RuleEngine {
        RuleEngine::new(Weights::default(), 1, 10)
    }

    fn load_features(pods: f64, cpu: f64, memory: f64, network: f64) -> FeatureVector {
        FeatureVector {
            pod_count: pods,
            cpu_current: cpu,
            memory_current: memory,
            network_total: network,
            ..Default::default()
        }
    }

    #[test]
    fn test_scores_low_load() {
        let scores = engine().score(&load_features(3.0, 100.0, 150.0, 2.0));

        assert!((scores.cpu_score - 20.0).abs() < 1e-9);
        assert!((scores.memory_score - 29.296875).abs() < 1e-6);
        assert!((scores.network_score - 20.0).abs() < 1e-9);
        assert!((scores.cost_score - 70.0).abs() < 1e-9);
        assert!((scores.total_score - 27.7890625).abs() < 1e-6);
    }

    #[test]
    fn test_scores_capped_at_hundred() {
        let scores = engine().score(&load_features(2.0, 700.0, 600.0, 15.0));

        assert_eq!(scores.cpu_score, 100.0);
        assert_eq!(scores.memory_score, 100.0);
        assert_eq!(scores.network_score, 100.0);
        assert!((scores.cost_score - 80.0).abs() < 1e-9);
        assert!((scores.total_score - 98.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_load_axis_scores() {
        let scores = engine().score(&load_features(5.0, 0.0, 0.0, 0.0));

        assert_eq!(scores.cpu_score, 0.0);
        assert_eq!(scores.memory_score, 0.0);
        assert_eq!(scores.network_score, 0.0);
        assert!((scores.cost_score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_uniform_axis_scores_pass_through() {
        // If every axis lands on the same score, the weighted total equals it
        let engine = engine();
        // cpu 250/500, memory 256/512, network 5/10 are all 50; 5 pods of 10 puts cost at 50
        let scores = engine.score(&load_features(5.0, 250.0, 256.0, 5.0));

        assert!((scores.cpu_score - 50.0).abs() < 1e-9);
        assert!((scores.memory_score - 50.0).abs() < 1e-9);
        assert!((scores.network_score - 50.0).abs() < 1e-9);
        assert!((scores.cost_score - 50.0).abs() < 1e-9);
        assert!((scores.total_score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_optimal_replicas_low_load() {
        // 100 m/pod over 3 pods wants a single pod at the 500 m target
        let optimal = engine().optimal_replicas(&load_features(3.0, 100.0, 150.0, 2.0));
        assert_eq!(optimal, 1);
    }

    #[test]
    fn test_optimal_replicas_high_load() {
        let optimal = engine().optimal_replicas(&load_features(2.0, 700.0, 600.0, 15.0));
        assert_eq!(optimal, 3);
    }

    #[test]
    fn test_optimal_replicas_memory_dominates() {
        // CPU says 1 pod, memory says 4: resources must cover the max
        let optimal = engine().optimal_replicas(&load_features(2.0, 100.0, 1000.0, 1.0));
        assert_eq!(optimal, 4);
    }

    #[test]
    fn test_idle_cpu_ignores_memory_pressure() {
        // Under 10 m/pod the memory estimate no longer holds replicas up
        let optimal = engine().optimal_replicas(&load_features(5.0, 3.0, 50.0, 0.1));
        assert_eq!(optimal, 1);
    }

    #[test]
    fn test_optimal_replicas_clamped_to_range() {
        let engine = RuleEngine::new(Weights::default(), 2, 4);

        let high = engine.optimal_replicas(&load_features(3.0, 2000.0, 100.0, 1.0));
        assert_eq!(high, 4);

        let low = engine.optimal_replicas(&load_features(3.0, 20.0, 30.0, 0.1));
        assert_eq!(low, 2);
    }

    #[test]
    fn test_weights_normalized() {
        let weights = Weights {
            cpu: 2.0,
            memory: 1.0,
            network: 0.5,
            cost: 0.5,
        }
        .normalized();

        let sum = weights.cpu + weights.memory + weights.network + weights.cost;
        assert!((sum - 1.0).abs() < 1e-9);
        assert!((weights.cpu - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_weights_fall_back_to_defaults() {
        let weights = Weights {
            cpu: 0.0,
            memory: 0.0,
            network: 0.0,
            cost: 0.0,
        }
        .normalized();

        assert_eq!(weights, Weights::default());
    }
}
