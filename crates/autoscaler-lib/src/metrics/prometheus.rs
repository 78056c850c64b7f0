//! Prometheus HTTP API client
//!
//! Issues instant and range PromQL queries against the backend's
//! `/api/v1/query` endpoints. Instant queries are bounded to 10 s, range
//! queries to 30 s. The network queries are cluster-wide (cAdvisor job
//! selector, no namespace filter), matching what the cluster actually
//! labels those series with.

use super::MetricsSource;
use crate::error::ScalerError;
use crate::models::{
    CpuUsage, HistoricalMetric, HistoricalSeries, MemoryUsage, NetworkIo, SamplePoint,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const INSTANT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const RANGE_QUERY_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Range query resolution
const RANGE_STEP: &str = "15s";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Client for the Prometheus HTTP API
pub struct PrometheusSource {
    client: Client,
    base_url: Url,
}

impl PrometheusSource {
    pub fn new(base_url: &str) -> Result<Self, ScalerError> {
        let client = Client::builder().build()?;
        let base_url = Url::parse(base_url.trim_end_matches('/'))?;
        Ok(Self { client, base_url })
    }

    /// Execute an instant query, returning the first scalar result.
    /// An empty result set reads as zero.
    async fn query_scalar(&self, query: &str) -> Result<f64, ScalerError> {
        let url = self.api_url("query");
        let response = self
            .client
            .get(url)
            .query(&[("query", query)])
            .timeout(INSTANT_QUERY_TIMEOUT)
            .send()
            .await?;
        let envelope: ApiResponse = response.error_for_status()?.json().await?;
        let data = envelope.into_data()?;

        match data.result.first().and_then(|r| r.value.as_ref()) {
            Some((_, raw)) => parse_value(raw),
            None => Ok(0.0),
        }
    }

    /// Execute a range query, returning the first matching series
    async fn query_range(
        &self,
        query: &str,
        start: f64,
        end: f64,
    ) -> Result<Vec<SamplePoint>, ScalerError> {
        let url = self.api_url("query_range");
        let response = self
            .client
            .get(url)
            .query(&[
                ("query", query.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("step", RANGE_STEP.to_string()),
            ])
            .timeout(RANGE_QUERY_TIMEOUT)
            .send()
            .await?;
        let envelope: ApiResponse = response.error_for_status()?.json().await?;
        let data = envelope.into_data()?;

        let mut points = Vec::new();
        if let Some(series) = data.result.first() {
            for (ts, raw) in &series.values {
                points.push(SamplePoint {
                    timestamp: *ts as i64,
                    value: parse_value(raw)?,
                });
            }
        }
        Ok(points)
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/api/v1/{}",
            self.base_url.as_str().trim_end_matches('/'),
            endpoint
        )
    }
}

#[async_trait]
impl MetricsSource for PrometheusSource {
    async fn pod_count(&self, namespace: &str, app_prefix: &str) -> Result<u32, ScalerError> {
        let query = pod_count_query(namespace, app_prefix);
        let count = self.query_scalar(&query).await.map_err(|e| {
            warn!(error = %e, "Pod count query failed");
            e
        })?;
        Ok(count as u32)
    }

    async fn cpu_usage(&self, namespace: &str, app_prefix: &str) -> Result<CpuUsage, ScalerError> {
        let total_mcores = self
            .query_scalar(&cpu_total_query(namespace, app_prefix))
            .await
            .map_err(|e| {
                warn!(error = %e, "CPU usage query failed");
                e
            })?;
        let pods = self.pod_count(namespace, app_prefix).await?;

        let per_pod_mcores = if pods > 0 {
            total_mcores / pods as f64
        } else {
            0.0
        };

        Ok(CpuUsage {
            total_mcores,
            per_pod_mcores,
        })
    }

    async fn memory_usage(
        &self,
        namespace: &str,
        app_prefix: &str,
    ) -> Result<MemoryUsage, ScalerError> {
        let total_bytes = self
            .query_scalar(&memory_total_query(namespace, app_prefix))
            .await
            .map_err(|e| {
                warn!(error = %e, "Memory usage query failed");
                e
            })?;
        let pods = self.pod_count(namespace, app_prefix).await?;

        let per_pod_bytes = if pods > 0 {
            total_bytes / pods as f64
        } else {
            0.0
        };

        Ok(MemoryUsage {
            total_bytes,
            per_pod_bytes,
            total_mb: total_bytes / BYTES_PER_MB,
            per_pod_mb: per_pod_bytes / BYTES_PER_MB,
        })
    }

    async fn network_io(
        &self,
        _namespace: &str,
        _app_prefix: &str,
    ) -> Result<NetworkIo, ScalerError> {
        let in_bps = self.query_scalar(NETWORK_RX_QUERY).await.map_err(|e| {
            warn!(error = %e, "Network receive query failed");
            e
        })?;
        let out_bps = self.query_scalar(NETWORK_TX_QUERY).await.map_err(|e| {
            warn!(error = %e, "Network transmit query failed");
            e
        })?;

        Ok(NetworkIo {
            in_bps,
            out_bps,
            in_mbps: in_bps * 8.0 / BYTES_PER_MB,
            out_mbps: out_bps * 8.0 / BYTES_PER_MB,
        })
    }

    async fn historical(
        &self,
        metric: HistoricalMetric,
        namespace: &str,
        app_prefix: &str,
        window_minutes: i64,
    ) -> Result<HistoricalSeries, ScalerError> {
        let end = Utc::now();
        let start = end - ChronoDuration::minutes(window_minutes);

        let query = match metric {
            HistoricalMetric::Cpu => cpu_total_query(namespace, app_prefix),
            HistoricalMetric::Memory => memory_total_query(namespace, app_prefix),
        };

        let mut points = self
            .query_range(&query, start.timestamp() as f64, end.timestamp() as f64)
            .await
            .map_err(|e| {
                warn!(metric = metric.as_str(), error = %e, "Range query failed");
                e
            })?;

        // The memory series is queried in bytes; features work in MB.
        if metric == HistoricalMetric::Memory {
            for point in &mut points {
                point.value /= BYTES_PER_MB;
            }
        }

        debug!(
            metric = metric.as_str(),
            samples = points.len(),
            "Fetched historical series"
        );
        Ok(HistoricalSeries { points })
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/-/healthy", self.base_url.as_str().trim_end_matches('/'));

        match self
            .client
            .get(url)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Metrics backend health check failed");
                false
            }
        }
    }
}

fn pod_count_query(namespace: &str, app_prefix: &str) -> String {
    format!(r#"count(kube_pod_info{{namespace="{namespace}", pod=~"{app_prefix}.*"}})"#)
}

fn cpu_total_query(namespace: &str, app_prefix: &str) -> String {
    format!(
        r#"sum(rate(container_cpu_usage_seconds_total{{namespace="{namespace}",pod=~"{app_prefix}.*"}}[1m])) * 1000"#
    )
}

fn memory_total_query(namespace: &str, app_prefix: &str) -> String {
    format!(
        r#"sum(container_memory_working_set_bytes{{namespace="{namespace}",pod=~"{app_prefix}.*"}})"#
    )
}

const NETWORK_RX_QUERY: &str =
    r#"sum(rate(container_network_receive_bytes_total{job="kubernetes-cadvisor"}[1m]))"#;
const NETWORK_TX_QUERY: &str =
    r#"sum(rate(container_network_transmit_bytes_total{job="kubernetes-cadvisor"}[1m]))"#;

fn parse_value(raw: &str) -> Result<f64, ScalerError> {
    raw.parse::<f64>()
        .map_err(|_| ScalerError::Decode(format!("non-numeric sample value: {raw:?}")))
}

// Prometheus HTTP API response envelope

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default)]
    error: Option<String>,
}

impl ApiResponse {
    fn into_data(self) -> Result<ApiData, ScalerError> {
        if self.status != "success" {
            return Err(ScalerError::Backend(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| ScalerError::Decode("missing data section".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ApiData {
    #[serde(default)]
    result: Vec<ApiResult>,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    #[serde(default)]
    value: Option<(f64, String)>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}
