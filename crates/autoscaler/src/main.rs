//! Replica autoscaler binary
//!
//! Periodically observes the target deployment's utilization through the
//! metrics backend, decides an optimal replica count by fusing rule-based
//! and learned estimates, and patches the deployment spec under cooldown.

use anyhow::Result;
use autoscaler_lib::{
    ControlLoop, DecisionEngine, FeatureEngineer, KubeDeployment, LoopConfig, MLPredictor,
    MetricsSource, PrometheusSource, ScalerMetrics,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

/// ML-augmented replica autoscaler for a Kubernetes deployment
#[derive(Parser)]
#[command(name = "autoscaler")]
#[command(author, version, about = "ML-augmented replica autoscaler", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Compute and log decisions without patching the deployment
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();

    info!("Starting replica autoscaler");

    let config = match config::ScalerConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Configuration error");
            std::process::exit(2);
        }
    };

    info!(
        namespace = %config.target.namespace,
        deployment = %config.target.deployment,
        min_replicas = config.scaling.min_replicas,
        max_replicas = config.scaling.max_replicas,
        check_interval_secs = config.scaling.check_interval,
        cooldown_secs = config.scaling.cooldown_period,
        dry_run = cli.dry_run,
        "Autoscaler configured"
    );

    let source: Arc<dyn MetricsSource> = match PrometheusSource::new(&config.prometheus.url) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "Configuration error");
            std::process::exit(2);
        }
    };

    // The loop refuses to start against an unreachable backend
    if !source.health_check().await {
        error!(url = %config.prometheus.url, "Metrics backend health check failed");
        std::process::exit(1);
    }
    info!(url = %config.prometheus.url, "Metrics backend connection verified");

    let metrics = ScalerMetrics::new();
    let state = api::AppState::new();
    if config.api.port != 0 {
        let _api_handle = tokio::spawn(api::serve(config.api.port, state.clone()));
    }

    let predictor = MLPredictor::new(&config.model.path);
    let engine = DecisionEngine::new(
        config.weights,
        config.scaling.min_replicas,
        config.scaling.max_replicas,
        predictor,
    );
    let engineer = FeatureEngineer::new(source);
    let actuator = Arc::new(
        KubeDeployment::new(&config.target.namespace, &config.target.deployment).await?,
    );

    let loop_config = LoopConfig {
        namespace: config.target.namespace.clone(),
        app_prefix: config.target.deployment.clone(),
        check_interval: Duration::from_secs(config.scaling.check_interval),
        cooldown_period: Duration::from_secs(config.scaling.cooldown_period),
        dry_run: cli.dry_run,
    };
    let control = ControlLoop::new(engineer, engine, actuator, loop_config, metrics);

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let loop_handle = tokio::spawn(control.run(shutdown_rx));

    state.ready.store(true, Ordering::Relaxed);

    // Wait for shutdown signal; the loop logs its summary before exiting
    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");
    let _ = shutdown_tx.send(());
    let _ = loop_handle.await;

    Ok(())
}
