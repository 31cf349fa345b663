//! Kubernetes cluster access.
//!
//! This module provides:
//! - [`ClusterClient`]: the operations a release performs on a cluster
//! - [`KubeApiClient`]: a `kube` client built from a kubeconfig document
//! - [`ClusterConnector`]: builds a fresh client for each release target

mod client;
#[cfg(test)]
pub(crate) mod fake;

pub use client::{ClusterClient, DeploymentExt, KubeApiClient, PULL_POLICY_ALWAYS};

use async_trait::async_trait;

use crate::error::Result;

/// Builds cluster clients from credential documents.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Connects to `cluster` using a kubeconfig document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is unusable.
    async fn connect(&self, cluster: &str, kubeconfig: &str) -> Result<Box<dyn ClusterClient>>;
}

/// Connector producing [`KubeApiClient`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct KubeConnector;

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, cluster: &str, kubeconfig: &str) -> Result<Box<dyn ClusterClient>> {
        Ok(Box::new(KubeApiClient::from_kubeconfig(cluster, kubeconfig).await?))
    }
}
