//! Deployment replica actuation against the cluster control plane

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Patch, PatchParams};
use kube::Api;
use tracing::info;

/// Trait for replica actuation implementations
#[async_trait]
pub trait ReplicaActuator: Send + Sync {
    /// Read the deployment's current `.spec.replicas`
    async fn current_replicas(&self) -> Result<i32>;

    /// Patch the deployment's `.spec.replicas`
    async fn scale_to(&self, replicas: i32) -> Result<()>;
}

/// Actuator over a named Deployment in one namespace
pub struct KubeDeployment {
    api: Api<Deployment>,
    name: String,
}

impl KubeDeployment {
    /// Connect using in-cluster configuration when available, falling back
    /// to the local kubeconfig
    pub async fn new(namespace: &str, deployment: &str) -> Result<Self> {
        let client = kube::Client::try_default()
            .await
            .context("Failed to initialize Kubernetes client")?;
        info!(namespace, deployment, "Connected to Kubernetes API");

        Ok(Self {
            api: Api::namespaced(client, namespace),
            name: deployment.to_string(),
        })
    }
}

#[async_trait]
impl ReplicaActuator for KubeDeployment {
    async fn current_replicas(&self) -> Result<i32> {
        let deployment = self
            .api
            .get(&self.name)
            .await
            .with_context(|| format!("Failed to read deployment {}", self.name))?;

        Ok(deployment.spec.and_then(|s| s.replicas).unwrap_or(1))
    }

    async fn scale_to(&self, replicas: i32) -> Result<()> {
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        self.api
            .patch(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("Failed to scale deployment {}", self.name))?;

        info!(deployment = %self.name, replicas, "Scaled deployment");
        Ok(())
    }
}
