//! Autoscaler configuration
//!
//! YAML file plus `SCALER_`-prefixed environment overrides, with defaults
//! for every key. A missing file falls back to defaults with a warning; a
//! file that fails to parse is a configuration error.

use anyhow::{Context, Result};
use autoscaler_lib::Weights;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScalerConfig {
    #[serde(default)]
    pub prometheus: PrometheusConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub scaling: ScalingConfig,
    #[serde(default)]
    pub weights: Weights,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusConfig {
    /// Base URL of the metrics backend
    #[serde(default = "default_prometheus_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Deployment name, also used as the pod-name prefix in queries
    #[serde(default = "default_deployment")]
    pub deployment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScalingConfig {
    #[serde(default = "default_min_replicas")]
    pub min_replicas: i32,

    #[serde(default = "default_max_replicas")]
    pub max_replicas: i32,

    /// Seconds between scaling cycles
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Minimum seconds between successive actuations
    #[serde(default = "default_cooldown_period")]
    pub cooldown_period: u64,
}

/// Reserved keys; scoring currently uses fixed per-pod targets
#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_threshold")]
    pub cpu_target: f64,
    #[serde(default = "default_threshold")]
    pub memory_target: f64,
    #[serde(default = "default_threshold")]
    pub network_target: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Where the trained model and its recent samples are persisted
    #[serde(default = "default_model_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Port for the health/metrics endpoints; 0 disables the server
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_prometheus_url() -> String {
    "http://localhost:30090".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_deployment() -> String {
    "tomcat-sample-app".to_string()
}

fn default_min_replicas() -> i32 {
    1
}

fn default_max_replicas() -> i32 {
    10
}

fn default_check_interval() -> u64 {
    30
}

fn default_cooldown_period() -> u64 {
    60
}

fn default_threshold() -> f64 {
    70.0
}

fn default_model_path() -> String {
    "models/scaler_model.json".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: default_prometheus_url(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            deployment: default_deployment(),
        }
    }
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_replicas: default_min_replicas(),
            max_replicas: default_max_replicas(),
            check_interval: default_check_interval(),
            cooldown_period: default_cooldown_period(),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_target: default_threshold(),
            memory_target: default_threshold(),
            network_target: default_threshold(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

impl ScalerConfig {
    /// Load configuration from the given file and the environment
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let config = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("SCALER").separator("__"))
            .build()
            .context("Failed to read configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Invalid configuration")?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_file_missing() {
        let config = ScalerConfig::load(Path::new("/nonexistent/config.yaml")).unwrap();

        assert_eq!(config.prometheus.url, "http://localhost:30090");
        assert_eq!(config.target.namespace, "default");
        assert_eq!(config.scaling.min_replicas, 1);
        assert_eq!(config.scaling.max_replicas, 10);
        assert_eq!(config.scaling.check_interval, 30);
        assert_eq!(config.scaling.cooldown_period, 60);
        assert_eq!(config.weights, Weights::default());
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "prometheus:\n  url: http://prom:9090\ntarget:\n  namespace: staging\n  deployment: web\nscaling:\n  min_replicas: 2\n  max_replicas: 6\n  check_interval: 15\nweights:\n  cpu: 0.5\n  memory: 0.3\n  network: 0.1\n  cost: 0.1"
        )
        .unwrap();

        let config = ScalerConfig::load(&path).unwrap();

        assert_eq!(config.prometheus.url, "http://prom:9090");
        assert_eq!(config.target.namespace, "staging");
        assert_eq!(config.target.deployment, "web");
        assert_eq!(config.scaling.min_replicas, 2);
        assert_eq!(config.scaling.max_replicas, 6);
        assert_eq!(config.scaling.check_interval, 15);
        // Unspecified keys keep their defaults
        assert_eq!(config.scaling.cooldown_period, 60);
        assert!((config.weights.cpu - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_partial_weights_fill_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "weights:\n  cpu: 0.7\n").unwrap();

        let config = ScalerConfig::load(&path).unwrap();

        assert!((config.weights.cpu - 0.7).abs() < 1e-9);
        assert!((config.weights.memory - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "scaling:\n  min_replicas: [not, a, number]\n").unwrap();

        assert!(ScalerConfig::load(&path).is_err());
    }
}
