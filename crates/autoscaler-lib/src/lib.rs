//! Autoscaler library for a replicated Kubernetes workload
//!
//! This crate provides the core functionality for:
//! - Metric acquisition from a Prometheus backend
//! - Feature engineering over snapshots and history
//! - Rule-based scoring and an online-trained replica regressor
//! - Decision fusion with dampening and cooldown
//! - The periodic control loop and replica actuation

pub mod control;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod predictor;

pub use control::{ControlLoop, LoopConfig};
pub use engine::{DecisionEngine, RuleEngine, Weights};
pub use error::ScalerError;
pub use metrics::{MetricsSource, PrometheusSource};
pub use models::*;
pub use observability::ScalerMetrics;
pub use orchestrator::{KubeDeployment, ReplicaActuator};
pub use predictor::{FeatureEngineer, MLPredictor};
