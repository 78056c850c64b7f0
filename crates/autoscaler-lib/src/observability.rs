//! Self-metrics for the scaling loop
//!
//! Prometheus metrics describing the autoscaler itself: cycle throughput,
//! actuation counts, and the latest decision's key signals.

use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;

/// Histogram buckets for cycle durations (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    cycles_total: IntCounter,
    cycle_errors_total: IntCounter,
    cooldown_blocks_total: IntCounter,
    scale_actions_total: IntCounterVec,
    current_replicas: IntGauge,
    target_replicas: IntGauge,
    total_score: Gauge,
    training_samples: IntGauge,
    cycle_duration_seconds: Histogram,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            cycles_total: register_int_counter!(
                "autoscaler_cycles_total",
                "Total number of scaling cycles started"
            )
            .expect("Failed to register cycles_total"),

            cycle_errors_total: register_int_counter!(
                "autoscaler_cycle_errors_total",
                "Total number of scaling cycles that ended in an error"
            )
            .expect("Failed to register cycle_errors_total"),

            cooldown_blocks_total: register_int_counter!(
                "autoscaler_cooldown_blocks_total",
                "Scale actions suppressed by the cooldown period"
            )
            .expect("Failed to register cooldown_blocks_total"),

            scale_actions_total: register_int_counter_vec!(
                "autoscaler_scale_actions_total",
                "Successful scale actions by direction",
                &["direction"]
            )
            .expect("Failed to register scale_actions_total"),

            current_replicas: register_int_gauge!(
                "autoscaler_current_replicas",
                "Replica count observed at the last cycle"
            )
            .expect("Failed to register current_replicas"),

            target_replicas: register_int_gauge!(
                "autoscaler_target_replicas",
                "Replica target chosen by the last decision"
            )
            .expect("Failed to register target_replicas"),

            total_score: register_gauge!(
                "autoscaler_total_score",
                "Weighted utilization score of the last cycle"
            )
            .expect("Failed to register total_score"),

            training_samples: register_int_gauge!(
                "autoscaler_training_samples",
                "Labeled samples collected by the replica model"
            )
            .expect("Failed to register training_samples"),

            cycle_duration_seconds: register_histogram!(
                "autoscaler_cycle_duration_seconds",
                "Wall-clock duration of one scaling cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),
        }
    }
}

/// Lightweight handle to the global metrics instance.
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScalerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn inc_cycles(&self) {
        self.inner().cycles_total.inc();
    }

    pub fn inc_cycle_errors(&self) {
        self.inner().cycle_errors_total.inc();
    }

    pub fn inc_cooldown_blocks(&self) {
        self.inner().cooldown_blocks_total.inc();
    }

    pub fn inc_scale_actions(&self, direction: &str) {
        self.inner()
            .scale_actions_total
            .with_label_values(&[direction])
            .inc();
    }

    pub fn set_replicas(&self, current: i64, target: i64) {
        self.inner().current_replicas.set(current);
        self.inner().target_replicas.set(target);
    }

    pub fn set_total_score(&self, score: f64) {
        self.inner().total_score.set(score);
    }

    pub fn set_training_samples(&self, samples: i64) {
        self.inner().training_samples.set(samples);
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handle_observes() {
        let metrics = ScalerMetrics::new();

        metrics.inc_cycles();
        metrics.inc_cycle_errors();
        metrics.inc_cooldown_blocks();
        metrics.inc_scale_actions("scale_up");
        metrics.set_replicas(3, 5);
        metrics.set_total_score(42.0);
        metrics.set_training_samples(12);
        metrics.observe_cycle_duration(0.2);
    }
}
