//! Metric acquisition from the cluster's time-series backend
//!
//! This module defines the source abstraction the feature engineer consumes
//! and the Prometheus HTTP implementation used in production. Every query is
//! timeout-bounded and failures are surfaced as errors the caller degrades
//! to zero readings; nothing here is fatal after startup.

mod prometheus;

pub use prometheus::PrometheusSource;

use crate::error::ScalerError;
use crate::models::{CpuUsage, HistoricalMetric, HistoricalSeries, MemoryUsage, NetworkIo};

pub use async_trait::async_trait;

/// Trait for metric source implementations
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Number of running pods whose name starts with `app_prefix`.
    /// Zero means no matching pods.
    async fn pod_count(&self, namespace: &str, app_prefix: &str) -> Result<u32, ScalerError>;

    /// CPU rate across the workload, in millicores total and per pod
    async fn cpu_usage(&self, namespace: &str, app_prefix: &str) -> Result<CpuUsage, ScalerError>;

    /// Working-set memory across the workload
    async fn memory_usage(
        &self,
        namespace: &str,
        app_prefix: &str,
    ) -> Result<MemoryUsage, ScalerError>;

    /// Cluster-wide network receive/transmit rates
    async fn network_io(&self, namespace: &str, app_prefix: &str)
        -> Result<NetworkIo, ScalerError>;

    /// Range query over the lookback window at 15 s resolution
    async fn historical(
        &self,
        metric: HistoricalMetric,
        namespace: &str,
        app_prefix: &str,
        window_minutes: i64,
    ) -> Result<HistoricalSeries, ScalerError>;

    /// Probe the backend's liveness endpoint
    async fn health_check(&self) -> bool;
}
