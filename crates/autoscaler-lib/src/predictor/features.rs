//! Feature engineering over metric snapshots and history
//!
//! Derives the fixed feature record each decision cycle consumes: current
//! state, rolling statistics, calendar context, linear trends, and pattern
//! labels. The record always has the full shape; groups whose history is
//! too short degrade to zeros and `Unknown` patterns.

use crate::engine::rules::{TARGET_CPU_MCORES, TARGET_MEMORY_MB};
use crate::metrics::MetricsSource;
use crate::models::{
    FeatureVector, HistoricalMetric, HistoricalSeries, LoadPattern, MetricSnapshot,
};
use anyhow::Result;
use chrono::{DateTime, Datelike, Local, Timelike, Utc};
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::{debug, warn};

/// Minimum history length before trends and patterns are computed
pub const MIN_HISTORY_SAMPLES: usize = 10;

/// Range-query lookback, minutes
const HISTORY_WINDOW_MINUTES: i64 = 15;

/// Samples in one hour at the 15 s range resolution
const HOURLY_SAMPLES: usize = 240;

/// Samples considered by the trend and pattern extractors
const TREND_WINDOW: usize = 60;

/// Window compared against the oldest samples for pattern labeling
const PATTERN_WINDOW: usize = 20;

/// Relative change (percent) separating increasing/decreasing from stable
const PATTERN_CHANGE_PCT: f64 = 10.0;

/// Derives feature vectors from the metrics source
pub struct FeatureEngineer {
    source: Arc<dyn MetricsSource>,
}

impl FeatureEngineer {
    pub fn new(source: Arc<dyn MetricsSource>) -> Self {
        Self { source }
    }

    /// Extract the feature vector for the current cycle.
    ///
    /// Individual metric failures degrade to zero readings; only a cycle in
    /// which every instant query fails returns an error.
    pub async fn extract(&self, namespace: &str, app_prefix: &str) -> Result<FeatureVector> {
        let snapshot = self.snapshot(namespace, app_prefix).await?;

        let cpu_history = self
            .source
            .historical(
                HistoricalMetric::Cpu,
                namespace,
                app_prefix,
                HISTORY_WINDOW_MINUTES,
            )
            .await
            .unwrap_or_default();
        let memory_history = self
            .source
            .historical(
                HistoricalMetric::Memory,
                namespace,
                app_prefix,
                HISTORY_WINDOW_MINUTES,
            )
            .await
            .unwrap_or_default();

        let features = Self::assemble(&snapshot, &cpu_history, &memory_history, Local::now());
        debug!(
            pod_count = snapshot.pod_count,
            cpu_samples = cpu_history.len(),
            memory_samples = memory_history.len(),
            "Extracted features"
        );
        Ok(features)
    }

    async fn snapshot(&self, namespace: &str, app_prefix: &str) -> Result<MetricSnapshot> {
        let mut failures = 0;

        let pod_count = self.source.pod_count(namespace, app_prefix).await.unwrap_or_else(|_| {
            failures += 1;
            0
        });
        let cpu = self.source.cpu_usage(namespace, app_prefix).await.unwrap_or_else(|_| {
            failures += 1;
            Default::default()
        });
        let memory = self
            .source
            .memory_usage(namespace, app_prefix)
            .await
            .unwrap_or_else(|_| {
                failures += 1;
                Default::default()
            });
        let network = self
            .source
            .network_io(namespace, app_prefix)
            .await
            .unwrap_or_else(|_| {
                failures += 1;
                Default::default()
            });

        if failures == 4 {
            warn!(namespace, app_prefix, "All instant metric queries failed");
            anyhow::bail!("all instant metric queries failed");
        }

        Ok(MetricSnapshot {
            timestamp: Utc::now(),
            pod_count,
            cpu,
            memory,
            network,
        })
    }

    /// Pure assembly of the feature vector, separated for testability
    pub fn assemble(
        snapshot: &MetricSnapshot,
        cpu_history: &HistoricalSeries,
        memory_history: &HistoricalSeries,
        now: DateTime<Local>,
    ) -> FeatureVector {
        let mut features = FeatureVector {
            pod_count: snapshot.pod_count as f64,
            cpu_current: snapshot.cpu.per_pod_mcores,
            cpu_total: snapshot.cpu.total_mcores,
            memory_current: snapshot.memory.per_pod_mb,
            memory_total: snapshot.memory.total_mb,
            network_in_rate: snapshot.network.in_mbps,
            network_out_rate: snapshot.network.out_mbps,
            network_total: snapshot.network.in_mbps + snapshot.network.out_mbps,
            ..Default::default()
        };
        if snapshot.pod_count > 0 {
            features.cpu_per_pod_ratio = features.cpu_current / TARGET_CPU_MCORES;
            features.memory_per_pod_ratio = features.memory_current / TARGET_MEMORY_MB;
        }

        let cpu_values = cpu_history.values();
        let memory_values = memory_history.values();

        apply_rolling(&mut features, &cpu_values, Metric::Cpu);
        apply_rolling(&mut features, &memory_values, Metric::Memory);
        apply_time(&mut features, now);
        apply_trend(&mut features, &cpu_values, Metric::Cpu);
        apply_trend(&mut features, &memory_values, Metric::Memory);
        apply_pattern(&mut features, &cpu_values, Metric::Cpu);
        apply_pattern(&mut features, &memory_values, Metric::Memory);

        features
    }
}

#[derive(Clone, Copy)]
enum Metric {
    Cpu,
    Memory,
}

fn apply_rolling(features: &mut FeatureVector, values: &[f64], metric: Metric) {
    if values.len() < 2 {
        return;
    }

    let avg = mean(values);
    let max = values.iter().cloned().fold(f64::MIN, f64::max);
    let min = values.iter().cloned().fold(f64::MAX, f64::min);
    let std = std_dev(values);
    let avg_1h = if values.len() >= HOURLY_SAMPLES {
        mean(&values[values.len() - HOURLY_SAMPLES..])
    } else {
        avg
    };
    let volatility = if avg > 0.0 { std / avg } else { 0.0 };

    match metric {
        Metric::Cpu => {
            features.cpu_avg_15m = avg;
            features.cpu_max_15m = max;
            features.cpu_min_15m = min;
            features.cpu_std_15m = std;
            features.cpu_avg_1h = avg_1h;
            features.cpu_volatility = volatility;
        }
        Metric::Memory => {
            features.memory_avg_15m = avg;
            features.memory_max_15m = max;
            features.memory_min_15m = min;
            features.memory_std_15m = std;
            features.memory_avg_1h = avg_1h;
            features.memory_volatility = volatility;
        }
    }
}

fn apply_time(features: &mut FeatureVector, now: DateTime<Local>) {
    let hour = now.hour();
    let day = now.weekday().num_days_from_monday();

    features.hour_of_day = hour;
    features.day_of_week = day;
    features.is_business_hours = (9..17).contains(&hour) && day < 5;
    features.is_weekend = day >= 5;
    features.is_peak_hour = matches!(hour, 9 | 10 | 11 | 14 | 15 | 16);
    features.hour_sin = (2.0 * PI * hour as f64 / 24.0).sin();
    features.hour_cos = (2.0 * PI * hour as f64 / 24.0).cos();
    features.day_sin = (2.0 * PI * day as f64 / 7.0).sin();
    features.day_cos = (2.0 * PI * day as f64 / 7.0).cos();
}

fn apply_trend(features: &mut FeatureVector, values: &[f64], metric: Metric) {
    if values.len() < MIN_HISTORY_SAMPLES {
        return;
    }

    let window = &values[values.len().saturating_sub(TREND_WINDOW)..];
    let (slope, intercept) = linear_fit(window);
    let strength = r_squared(window, slope, intercept);
    let n = window.len();
    let rate_of_change = if n >= 10 {
        window[n - 1] - window[n - 10]
    } else {
        window[n - 1] - window[0]
    };

    match metric {
        Metric::Cpu => {
            features.cpu_trend = slope;
            features.cpu_trend_strength = strength;
            features.cpu_rate_of_change = rate_of_change;
        }
        Metric::Memory => {
            features.memory_trend = slope;
            features.memory_trend_strength = strength;
            features.memory_rate_of_change = rate_of_change;
        }
    }
}

fn apply_pattern(features: &mut FeatureVector, values: &[f64], metric: Metric) {
    let pattern = classify_pattern(values);
    match metric {
        Metric::Cpu => {
            features.cpu_pattern = pattern;
            features.cpu_is_increasing = pattern == LoadPattern::Increasing;
            features.cpu_is_stable = pattern == LoadPattern::Stable;
            features.cpu_is_decreasing = pattern == LoadPattern::Decreasing;
        }
        Metric::Memory => {
            features.memory_pattern = pattern;
            features.memory_is_increasing = pattern == LoadPattern::Increasing;
            features.memory_is_stable = pattern == LoadPattern::Stable;
            features.memory_is_decreasing = pattern == LoadPattern::Decreasing;
        }
    }
}

/// Label a series by comparing the newest samples against the oldest
fn classify_pattern(values: &[f64]) -> LoadPattern {
    if values.len() < MIN_HISTORY_SAMPLES {
        return LoadPattern::Unknown;
    }

    let window = &values[values.len().saturating_sub(TREND_WINDOW)..];
    let take = PATTERN_WINDOW.min(window.len());
    let recent_avg = mean(&window[window.len() - take..]);
    let older_avg = mean(&window[..take]);

    let change_pct = if older_avg > 0.0 {
        (recent_avg - older_avg) / older_avg * 100.0
    } else {
        0.0
    };

    if change_pct > PATTERN_CHANGE_PCT {
        LoadPattern::Increasing
    } else if change_pct < -PATTERN_CHANGE_PCT {
        LoadPattern::Decreasing
    } else {
        LoadPattern::Stable
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Ordinary least squares fit over sample index, returning (slope, intercept)
pub fn linear_fit(values: &[f64]) -> (f64, f64) {
    if values.len() < 2 {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();

    let denom = n * sum_x2 - sum_x.powi(2);
    if denom.abs() < f64::EPSILON {
        return (0.0, 0.0);
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n;
    (slope, intercept)
}

/// Coefficient of determination of a linear fit, zero for flat series
pub fn r_squared(values: &[f64], slope: f64, intercept: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss_tot: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    if ss_tot <= 0.0 {
        return 0.0;
    }
    let ss_res: f64 = values
        .iter()
        .enumerate()
        .map(|(i, v)| (v - (slope * i as f64 + intercept)).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CpuUsage, MemoryUsage, NetworkIo, SamplePoint};
    use chrono::TimeZone;

    fn make_snapshot(pods: u32, cpu_per_pod: f64, memory_per_pod_mb: f64) -> MetricSnapshot {
        MetricSnapshot {
            timestamp: Utc::now(),
            pod_count: pods,
            cpu: CpuUsage {
                total_mcores: cpu_per_pod * pods as f64,
                per_pod_mcores: cpu_per_pod,
            },
            memory: MemoryUsage {
                total_bytes: memory_per_pod_mb * pods as f64 * 1024.0 * 1024.0,
                per_pod_bytes: memory_per_pod_mb * 1024.0 * 1024.0,
                total_mb: memory_per_pod_mb * pods as f64,
                per_pod_mb: memory_per_pod_mb,
            },
            network: NetworkIo {
                in_bps: 0.0,
                out_bps: 0.0,
                in_mbps: 1.5,
                out_mbps: 0.5,
            },
        }
    }

    fn make_series(values: &[f64]) -> HistoricalSeries {
        HistoricalSeries {
            points: values
                .iter()
                .enumerate()
                .map(|(i, v)| SamplePoint {
                    timestamp: 1_700_000_000 + i as i64 * 15,
                    value: *v,
                })
                .collect(),
        }
    }

    fn weekday_morning() -> DateTime<Local> {
        // Wednesday 2024-01-10 10:00 local
        Local.with_ymd_and_hms(2024, 1, 10, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_current_state_features() {
        let snapshot = make_snapshot(3, 250.0, 256.0);
        let f = FeatureEngineer::assemble(
            &snapshot,
            &HistoricalSeries::default(),
            &HistoricalSeries::default(),
            weekday_morning(),
        );

        assert_eq!(f.pod_count, 3.0);
        assert_eq!(f.cpu_current, 250.0);
        assert_eq!(f.cpu_total, 750.0);
        assert_eq!(f.memory_current, 256.0);
        assert_eq!(f.network_total, 2.0);
        assert!((f.cpu_per_pod_ratio - 0.5).abs() < 1e-9);
        assert!((f.memory_per_pod_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_time_features_weekday_peak() {
        let snapshot = make_snapshot(1, 0.0, 0.0);
        let f = FeatureEngineer::assemble(
            &snapshot,
            &HistoricalSeries::default(),
            &HistoricalSeries::default(),
            weekday_morning(),
        );

        assert_eq!(f.hour_of_day, 10);
        assert_eq!(f.day_of_week, 2);
        assert!(f.is_business_hours);
        assert!(f.is_peak_hour);
        assert!(!f.is_weekend);
    }

    #[test]
    fn test_time_features_weekend() {
        let snapshot = make_snapshot(1, 0.0, 0.0);
        // Saturday 2024-01-13 22:00 local
        let now = Local.with_ymd_and_hms(2024, 1, 13, 22, 0, 0).unwrap();
        let f = FeatureEngineer::assemble(
            &snapshot,
            &HistoricalSeries::default(),
            &HistoricalSeries::default(),
            now,
        );

        assert!(f.is_weekend);
        assert!(!f.is_business_hours);
        assert!(!f.is_peak_hour);
    }

    #[test]
    fn test_cyclic_encoding() {
        let snapshot = make_snapshot(1, 0.0, 0.0);
        // 06:00 puts the hour angle at pi/2
        let now = Local.with_ymd_and_hms(2024, 1, 10, 6, 0, 0).unwrap();
        let f = FeatureEngineer::assemble(
            &snapshot,
            &HistoricalSeries::default(),
            &HistoricalSeries::default(),
            now,
        );

        assert!((f.hour_sin - 1.0).abs() < 1e-9);
        assert!(f.hour_cos.abs() < 1e-9);
    }

    #[test]
    fn test_rolling_statistics() {
        let snapshot = make_snapshot(2, 100.0, 100.0);
        let values: Vec<f64> = vec![100.0, 200.0, 300.0, 400.0, 500.0];
        let f = FeatureEngineer::assemble(
            &snapshot,
            &make_series(&values),
            &HistoricalSeries::default(),
            weekday_morning(),
        );

        assert!((f.cpu_avg_15m - 300.0).abs() < 1e-9);
        assert_eq!(f.cpu_max_15m, 500.0);
        assert_eq!(f.cpu_min_15m, 100.0);
        assert!((f.cpu_std_15m - 141.42).abs() < 0.01);
        // Shorter than an hour of samples: 1h average falls back to 15m
        assert_eq!(f.cpu_avg_1h, f.cpu_avg_15m);
        assert!((f.cpu_volatility - f.cpu_std_15m / 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_on_linear_ramp() {
        let snapshot = make_snapshot(2, 100.0, 100.0);
        let values: Vec<f64> = (0..60).map(|i| i as f64).collect();
        let f = FeatureEngineer::assemble(
            &snapshot,
            &make_series(&values),
            &HistoricalSeries::default(),
            weekday_morning(),
        );

        assert!((f.cpu_trend - 1.0).abs() < 1e-9);
        assert!((f.cpu_trend_strength - 1.0).abs() < 1e-9);
        assert!((f.cpu_rate_of_change - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_zero_on_flat_series() {
        let snapshot = make_snapshot(2, 100.0, 100.0);
        let values = vec![50.0; 30];
        let f = FeatureEngineer::assemble(
            &snapshot,
            &make_series(&values),
            &HistoricalSeries::default(),
            weekday_morning(),
        );

        assert_eq!(f.cpu_trend, 0.0);
        assert_eq!(f.cpu_trend_strength, 0.0);
        assert_eq!(f.cpu_pattern, LoadPattern::Stable);
    }

    #[test]
    fn test_pattern_increasing() {
        let snapshot = make_snapshot(2, 100.0, 100.0);
        let mut values = vec![100.0; 20];
        values.extend(vec![200.0; 20]);
        let f = FeatureEngineer::assemble(
            &snapshot,
            &make_series(&values),
            &HistoricalSeries::default(),
            weekday_morning(),
        );

        assert_eq!(f.cpu_pattern, LoadPattern::Increasing);
        assert!(f.cpu_is_increasing);
        assert!(!f.cpu_is_stable);
    }

    #[test]
    fn test_pattern_decreasing_memory() {
        let snapshot = make_snapshot(2, 100.0, 100.0);
        let mut values = vec![400.0; 20];
        values.extend(vec![100.0; 20]);
        let f = FeatureEngineer::assemble(
            &snapshot,
            &HistoricalSeries::default(),
            &make_series(&values),
            weekday_morning(),
        );

        assert_eq!(f.memory_pattern, LoadPattern::Decreasing);
        assert!(f.memory_is_decreasing);
    }

    #[test]
    fn test_insufficient_history_defaults() {
        let snapshot = make_snapshot(3, 250.0, 256.0);
        let values = vec![1.0, 2.0, 3.0];
        let f = FeatureEngineer::assemble(
            &snapshot,
            &make_series(&values),
            &HistoricalSeries::default(),
            weekday_morning(),
        );

        // Current state still populated
        assert_eq!(f.cpu_current, 250.0);
        // Rolling stats available from 2 samples, trend/pattern are not
        assert!(f.cpu_avg_15m > 0.0);
        assert_eq!(f.cpu_trend, 0.0);
        assert_eq!(f.cpu_pattern, LoadPattern::Unknown);
        assert_eq!(f.memory_pattern, LoadPattern::Unknown);
    }

    #[test]
    fn test_assembly_is_reproducible() {
        let snapshot = make_snapshot(4, 320.0, 400.0);
        let cpu = make_series(&(0..60).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        let memory = make_series(&vec![300.0; 60]);
        let now = weekday_morning();

        let a = FeatureEngineer::assemble(&snapshot, &cpu, &memory, now);
        let b = FeatureEngineer::assemble(&snapshot, &cpu, &memory, now);
        assert_eq!(a, b);
    }

    #[test]
    fn test_linear_fit_and_r_squared() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let (slope, intercept) = linear_fit(&values);
        assert!((slope - 1.0).abs() < 1e-9);
        assert!((intercept - 1.0).abs() < 1e-9);
        assert!((r_squared(&values, slope, intercept) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_values() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
        assert_eq!(linear_fit(&[]), (0.0, 0.0));
        assert_eq!(classify_pattern(&[]), LoadPattern::Unknown);
    }
}
