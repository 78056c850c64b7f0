//! Top-level scaling loop
//!
//! Drives one strictly ordered cycle per tick: read deployment state,
//! extract features, decide, actuate under cooldown, record history.
//! Metric failures skip the cycle; actuation failures retry naturally on
//! the next tick.

use crate::engine::DecisionEngine;
use crate::models::{CycleRecord, Decision, ScaleAction, ScaleEvent};
use crate::observability::ScalerMetrics;
use crate::orchestrator::ReplicaActuator;
use crate::predictor::FeatureEngineer;
use anyhow::Result;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Entries retained in the scale and cycle histories
const HISTORY_LIMIT: usize = 100;

/// Actions echoed in the shutdown summary
const SUMMARY_TAIL: usize = 5;

/// Configuration for the scaling loop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Namespace of the target workload
    pub namespace: String,
    /// Pod-name prefix matching the target deployment's pods
    pub app_prefix: String,
    /// Time between cycles (default: 30 seconds)
    pub check_interval: Duration,
    /// Minimum time between successive actuations (default: 60 seconds)
    pub cooldown_period: Duration,
    /// Compute and log decisions without patching the deployment
    pub dry_run: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            app_prefix: String::new(),
            check_interval: Duration::from_secs(30),
            cooldown_period: Duration::from_secs(60),
            dry_run: false,
        }
    }
}

/// Periodic scaling loop owning the decision state and histories
pub struct ControlLoop {
    engineer: FeatureEngineer,
    engine: DecisionEngine,
    actuator: Arc<dyn ReplicaActuator>,
    config: LoopConfig,
    metrics: ScalerMetrics,
    last_scale_time: Option<Instant>,
    scale_history: VecDeque<ScaleEvent>,
    metrics_history: VecDeque<CycleRecord>,
}

impl ControlLoop {
    pub fn new(
        engineer: FeatureEngineer,
        engine: DecisionEngine,
        actuator: Arc<dyn ReplicaActuator>,
        config: LoopConfig,
        metrics: ScalerMetrics,
    ) -> Self {
        Self {
            engineer,
            engine,
            actuator,
            config,
            metrics,
            last_scale_time: None,
            scale_history: VecDeque::new(),
            metrics_history: VecDeque::new(),
        }
    }

    /// Run until the shutdown channel fires, then log the summary
    pub async fn run(mut self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.check_interval.as_secs(),
            cooldown_secs = self.config.cooldown_period.as_secs(),
            dry_run = self.config.dry_run,
            "Starting scaling loop"
        );

        let mut ticker = interval(self.config.check_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down scaling loop");
                    self.print_summary();
                    break;
                }
            }
        }
    }

    /// Execute one scaling cycle
    pub async fn run_cycle(&mut self) {
        let start = Instant::now();
        self.metrics.inc_cycles();

        if let Err(e) = self.cycle().await {
            self.metrics.inc_cycle_errors();
            error!(error = %e, "Scaling cycle failed");
        }

        self.metrics
            .observe_cycle_duration(start.elapsed().as_secs_f64());
    }

    async fn cycle(&mut self) -> Result<()> {
        let observed_replicas = match self.actuator.current_replicas().await {
            Ok(n) => {
                debug!(current_replicas = n, "Read deployment state");
                Some(n)
            }
            Err(e) => {
                error!(error = %e, "Failed to read current replicas, skipping actuation this cycle");
                None
            }
        };

        let features = match self
            .engineer
            .extract(&self.config.namespace, &self.config.app_prefix)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "Failed to extract features, skipping cycle");
                self.metrics.inc_cycle_errors();
                return Ok(());
            }
        };

        info!(
            pods = features.pod_count,
            cpu_mcores = features.cpu_current,
            memory_mb = features.memory_current,
            network_mbps = features.network_total,
            "Cycle metrics"
        );

        let decision = self.engine.decide(&features);

        self.metrics.set_replicas(
            decision.current_replicas as i64,
            decision.target_replicas as i64,
        );
        self.metrics.set_total_score(decision.scores.total_score);
        let stats = self.engine.predictor_stats();
        self.metrics
            .set_training_samples(stats.training_samples as i64);
        if stats.training_samples > 0 {
            debug!(
                samples = stats.training_samples,
                trained = stats.trained,
                "Model state"
            );
        }

        match decision.action {
            ScaleAction::NoChange => debug!("No scaling action needed"),
            _ => self.actuate(&decision, observed_replicas.is_some()).await,
        }

        self.metrics_history.push_back(CycleRecord {
            timestamp: Utc::now(),
            replicas: observed_replicas.unwrap_or(1),
            decision,
            features,
        });
        while self.metrics_history.len() > HISTORY_LIMIT {
            self.metrics_history.pop_front();
        }

        Ok(())
    }

    async fn actuate(&mut self, decision: &Decision, orchestrator_ok: bool) {
        if !orchestrator_ok {
            warn!("Orchestrator unavailable, skipping actuation");
            return;
        }

        if self.config.dry_run {
            info!(
                action = decision.action.as_str(),
                target_replicas = decision.target_replicas,
                "Dry run, skipping actuation"
            );
            return;
        }

        if let Some(remaining) = self.cooldown_remaining(Instant::now()) {
            self.metrics.inc_cooldown_blocks();
            info!(
                action = decision.action.as_str(),
                remaining_secs = remaining.as_secs(),
                "Scaling blocked by cooldown period"
            );
            return;
        }

        match self.actuator.scale_to(decision.target_replicas).await {
            Ok(()) => {
                self.last_scale_time = Some(Instant::now());
                self.scale_history.push_back(ScaleEvent {
                    timestamp: Utc::now(),
                    replicas: decision.target_replicas,
                });
                while self.scale_history.len() > HISTORY_LIMIT {
                    self.scale_history.pop_front();
                }
                self.metrics.inc_scale_actions(decision.action.as_str());
                info!(
                    action = decision.action.as_str(),
                    current_replicas = decision.current_replicas,
                    target_replicas = decision.target_replicas,
                    "Applied scaling action"
                );
            }
            Err(e) => {
                // last_scale_time stays untouched so the next cycle retries
                error!(error = %e, "Failed to scale deployment, will retry next cycle");
            }
        }
    }

    /// Time left in the cooldown window, `None` once actuation is allowed
    fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.last_scale_time?;
        let elapsed = now.duration_since(last);
        if elapsed < self.config.cooldown_period {
            Some(self.config.cooldown_period - elapsed)
        } else {
            None
        }
    }

    fn print_summary(&self) {
        if self.scale_history.is_empty() {
            info!("No scaling actions performed");
            return;
        }

        let replicas: Vec<i32> = self.scale_history.iter().map(|e| e.replicas).collect();
        let min = replicas.iter().min().copied().unwrap_or(0);
        let max = replicas.iter().max().copied().unwrap_or(0);
        let avg = replicas.iter().sum::<i32>() as f64 / replicas.len() as f64;

        info!(
            total_actions = self.scale_history.len(),
            min_replicas = min,
            max_replicas = max,
            avg_replicas = avg,
            "Scaling summary"
        );
        for event in self
            .scale_history
            .iter()
            .skip(self.scale_history.len().saturating_sub(SUMMARY_TAIL))
        {
            info!(
                timestamp = %event.timestamp,
                replicas = event.replicas,
                "Recent scaling action"
            );
        }
    }
}
