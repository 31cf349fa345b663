//! Release dispatcher: fans one release out over clusters and namespaces.

use tracing::{error, info};

use crate::cluster::ClusterConnector;
use crate::config::{ReleaseContext, ReleaseSettings};
use crate::error::{ConfigError, ReconcileError, Result, ShipyardError};

use super::deployment::{DeploymentReconciler, ReleaseOutcome};

/// Prefix of the per-cluster kubeconfig variables.
pub const CLUSTER_CREDENTIALS_PREFIX: &str = "GS_RELEASE_KUBERNETES_";

/// Runs a release against every `(cluster, namespace)` pair in order.
///
/// Targets are processed one at a time and the first failure stops the
/// run. Every target gets freshly resolved credentials and a new client.
pub struct ReleaseDispatcher<'a, C: ClusterConnector + ?Sized> {
    /// Builds cluster clients.
    connector: &'a C,
    /// Variable lookups for credentials.
    context: &'a ReleaseContext,
}

impl<'a, C: ClusterConnector + ?Sized> ReleaseDispatcher<'a, C> {
    /// Creates a dispatcher.
    #[must_use]
    pub const fn new(connector: &'a C, context: &'a ReleaseContext) -> Self {
        Self { connector, context }
    }

    /// Releases to every target.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before any remote call if a cluster or
    /// namespace entry is empty, otherwise `ReconcileError::TargetFailed`
    /// for the first target that fails.
    pub async fn dispatch(&self, settings: &ReleaseSettings) -> Result<Vec<ReleaseOutcome>> {
        let clusters = split_entries(&settings.clusters, "P_COLONY")?;
        let namespaces = split_entries(&settings.namespaces, "P_NAMESPACE")?;

        info!(
            "Release {} ({}) to clusters [{}] namespaces [{}] env {}",
            settings.service_name,
            settings.image,
            clusters.join(","),
            namespaces.join(","),
            settings.environment
        );

        let mut outcomes = Vec::with_capacity(clusters.len() * namespaces.len());
        for cluster in &clusters {
            for namespace in &namespaces {
                let outcome = self
                    .release_target(settings, cluster, namespace)
                    .await
                    .map_err(|e| {
                        error!("Release to {cluster}/{namespace} failed: {e}");
                        ShipyardError::from(ReconcileError::TargetFailed {
                            cluster: cluster.clone(),
                            namespace: namespace.clone(),
                            source: Box::new(e),
                        })
                    })?;
                outcomes.push(outcome);
            }
        }

        Ok(outcomes)
    }

    async fn release_target(&self, settings: &ReleaseSettings, cluster: &str, namespace: &str) -> Result<ReleaseOutcome> {
        let kubeconfig = self.credentials(cluster, &settings.environment).await?;
        let image = settings.image_rewrites.rewrite(cluster, &settings.image);
        info!(
            "Release to Kubernetes ({cluster}) {} / {namespace} <-- {image}",
            settings.service_name
        );

        let client = self.connector.connect(cluster, &kubeconfig).await?;
        DeploymentReconciler::new(client.as_ref(), &settings.environment)
            .release(namespace, &settings.service_name, &image)
            .await
    }

    /// Looks up `<prefix><CLUSTER>_<ENV>`, then `<prefix><CLUSTER>`.
    async fn credentials(&self, cluster: &str, environment: &str) -> Result<String> {
        let scoped = format!(
            "{CLUSTER_CREDENTIALS_PREFIX}{cluster}_{}",
            environment.to_uppercase()
        );
        let shared = format!("{CLUSTER_CREDENTIALS_PREFIX}{cluster}");

        self.context
            .get_first(&[scoped.as_str(), shared.as_str()])
            .await
            .ok_or_else(|| ConfigError::missing(format!("{scoped} or {shared}")).into())
    }
}

/// Splits a comma-separated list, rejecting empty entries.
fn split_entries(raw: &str, field: &str) -> Result<Vec<String>> {
    let entries: Vec<String> = raw.split(',').map(|e| e.trim().to_string()).collect();
    if entries.iter().any(String::is_empty) {
        return Err(ConfigError::validation(format!("{field} has an empty entry: '{raw}'"), field).into());
    }
    Ok(entries)
}
