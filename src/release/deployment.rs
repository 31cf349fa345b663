//! Deployment reconciler for one cluster and namespace.
//!
//! Steps, in order:
//! 1. resolve the namespace: the requested one, else `<namespace>-<env>`,
//!    else skip the target
//! 2. make sure the first container pulls `Always`
//! 3. same image: recycle the pods so they pull it again; different image:
//!    patch the deployment and let the rollout replace the pods

use serde::Serialize;
use tracing::{info, warn};

use crate::cluster::{ClusterClient, DeploymentExt, PULL_POLICY_ALWAYS};
use crate::error::{ClusterError, ReconcileError, Result};

/// Label keys tried in order when looking for a deployment's pods.
///
/// Upstream, Alibaba Cloud and Tencent Cloud clusters label workloads with
/// different keys.
pub const SELECTOR_PRIORITY: [&str; 3] = ["app", "k8s-app", "qcloud-app"];

/// What a release did to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReleaseAction {
    /// Neither the namespace nor its environment variant exists.
    Skipped,
    /// The deployment image was replaced.
    ImagePatched {
        /// Image now on the deployment.
        image: String,
    },
    /// The image was already current; its pods were deleted.
    PodsRecycled {
        /// Selector that matched the pods.
        selector: String,
        /// Deleted pod names.
        pods: Vec<String>,
    },
}

/// Outcome of releasing to one namespace of one cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseOutcome {
    /// Cluster name.
    pub cluster: String,
    /// Namespace as requested.
    pub requested_namespace: String,
    /// Namespace actually used, if any.
    pub namespace: Option<String>,
    /// Whether the pull policy had to be changed.
    pub pull_policy_updated: bool,
    /// Action taken.
    #[serde(flatten)]
    pub action: ReleaseAction,
}

/// Reconciles one deployment toward a desired image.
pub struct DeploymentReconciler<'a, C: ClusterClient + ?Sized> {
    /// Cluster client.
    client: &'a C,
    /// Environment name, used for the namespace fallback.
    environment: &'a str,
}

impl<'a, C: ClusterClient + ?Sized> DeploymentReconciler<'a, C> {
    /// Creates a reconciler.
    #[must_use]
    pub const fn new(client: &'a C, environment: &'a str) -> Self {
        Self { client, environment }
    }

    /// Releases `image` to `service` in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::TargetNotFound` if the deployment, or (for an
    /// unchanged image) its pods, cannot be found, and the client's error if
    /// an API call fails.
    pub async fn release(&self, namespace: &str, service: &str, image: &str) -> Result<ReleaseOutcome> {
        let cluster = self.client.cluster_name().to_string();
        let mut outcome = ReleaseOutcome {
            cluster: cluster.clone(),
            requested_namespace: namespace.to_string(),
            namespace: None,
            pull_policy_updated: false,
            action: ReleaseAction::Skipped,
        };

        let Some(resolved) = self.resolve_namespace(namespace).await? else {
            warn!("[{cluster}] (env: {}) -> {namespace} namespace not found, skipping", self.environment);
            return Ok(outcome);
        };
        info!("[{cluster}] Workspace -> {resolved}");
        outcome.namespace = Some(resolved.clone());

        let not_found = |what: &str| ReconcileError::TargetNotFound {
            cluster: cluster.clone(),
            namespace: resolved.clone(),
            service: service.to_string(),
            what: what.to_string(),
        };

        let deployment = match self.client.get_deployment(&resolved, service).await {
            Ok(deployment) => deployment,
            Err(e) if e.is_not_found() => return Err(not_found("deployment").into()),
            Err(e) => return Err(e),
        };

        let Some(container) = deployment.primary_container().map(|c| c.name.clone()) else {
            let message = format!("deployment {resolved}/{service} has no containers");
            return Err(ClusterError::invalid(&cluster, message).into());
        };

        if deployment.image_pull_policy() != Some(PULL_POLICY_ALWAYS) {
            self.client
                .patch_pull_policy_always(&resolved, service, &container)
                .await?;
            outcome.pull_policy_updated = true;
        }

        info!("[{cluster}] Deployment image: {}", deployment.image());

        if deployment.image() == image {
            let (selector, pods) = self.find_pods(&resolved, service).await?;
            if pods.is_empty() {
                return Err(not_found("pods").into());
            }
            for pod in &pods {
                self.client.delete_pod(&resolved, pod).await?;
            }
            outcome.action = ReleaseAction::PodsRecycled { selector, pods };
        } else {
            self.client
                .patch_image(&resolved, service, &container, image)
                .await?;
            outcome.action = ReleaseAction::ImagePatched {
                image: image.to_string(),
            };
        }

        Ok(outcome)
    }

    async fn resolve_namespace(&self, requested: &str) -> Result<Option<String>> {
        let namespaces = self.client.list_namespaces().await?;
        if namespaces.iter().any(|n| n == requested) {
            return Ok(Some(requested.to_string()));
        }

        let fallback = format!("{requested}-{}", self.environment);
        warn!("{requested} namespace not found, trying {fallback}");
        Ok(namespaces.contains(&fallback).then_some(fallback))
    }

    /// Returns the first selector matching any pod, with the pods.
    async fn find_pods(&self, namespace: &str, service: &str) -> Result<(String, Vec<String>)> {
        let mut last = String::new();
        for key in SELECTOR_PRIORITY {
            let selector = format!("{key}={service}");
            let pods = self.client.list_pods(namespace, &selector).await?;
            if !pods.is_empty() {
                return Ok((selector, pods));
            }
            last = selector;
        }
        Ok((last, Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeCluster;
    use crate::error::{ErrorKind, ShipyardError};

    #[tokio::test]
    async fn test_same_image_recycles_pods() {
        let cluster = FakeCluster::new("HZ", &["svc"])
            .with_deployment("svc", "api", "registry/api:1", Some("Always"))
            .with_pods("svc", "app=api", &["api-1", "api-2"]);

        let outcome = DeploymentReconciler::new(&cluster, "test")
            .release("svc", "api", "registry/api:1")
            .await
            .unwrap();

        assert_eq!(
            outcome.action,
            ReleaseAction::PodsRecycled {
                selector: String::from("app=api"),
                pods: vec![String::from("api-1"), String::from("api-2")],
            }
        );
        let calls = cluster.calls();
        assert!(calls.contains(&String::from("delete_pod svc/api-1")));
        assert!(calls.contains(&String::from("delete_pod svc/api-2")));
        assert!(!calls.iter().any(|c| c.starts_with("patch_image")));
    }

    #[tokio::test]
    async fn test_different_image_patches_without_deleting() {
        let cluster = FakeCluster::new("HZ", &["svc"])
            .with_deployment("svc", "api", "registry/api:1", Some("Always"))
            .with_pods("svc", "app=api", &["api-1"]);

        let outcome = DeploymentReconciler::new(&cluster, "test")
            .release("svc", "api", "registry/api:2")
            .await
            .unwrap();

        assert_eq!(
            outcome.action,
            ReleaseAction::ImagePatched {
                image: String::from("registry/api:2")
            }
        );
        assert!(!outcome.pull_policy_updated);
        assert_eq!(
            cluster.calls(),
            vec![
                "list_namespaces",
                "get_deployment svc/api",
                "patch_image svc/api registry/api:2"
            ]
        );
    }

    #[tokio::test]
    async fn test_pull_policy_patched_first() {
        let cluster = FakeCluster::new("HZ", &["svc"])
            .with_deployment("svc", "api", "registry/api:1", Some("IfNotPresent"));

        let outcome = DeploymentReconciler::new(&cluster, "test")
            .release("svc", "api", "registry/api:2")
            .await
            .unwrap();

        assert!(outcome.pull_policy_updated);
        let calls = cluster.calls();
        assert_eq!(calls[2], "patch_pull_policy svc/api");
        assert_eq!(calls[3], "patch_image svc/api registry/api:2");
    }

    #[tokio::test]
    async fn test_selector_fallback_order() {
        let cluster = FakeCluster::new("SH", &["svc"])
            .with_deployment("svc", "api", "img", Some("Always"))
            .with_pods("svc", "qcloud-app=api", &["api-x"]);

        let outcome = DeploymentReconciler::new(&cluster, "test")
            .release("svc", "api", "img")
            .await
            .unwrap();

        let listed: Vec<String> = cluster
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("list_pods"))
            .collect();
        assert_eq!(
            listed,
            vec!["list_pods svc app=api", "list_pods svc k8s-app=api", "list_pods svc qcloud-app=api"]
        );
        assert!(matches!(outcome.action, ReleaseAction::PodsRecycled { ref selector, .. } if selector == "qcloud-app=api"));
    }

    #[tokio::test]
    async fn test_first_matching_selector_wins() {
        let cluster = FakeCluster::new("SH", &["svc"])
            .with_deployment("svc", "api", "img", Some("Always"))
            .with_pods("svc", "k8s-app=api", &["api-k"])
            .with_pods("svc", "qcloud-app=api", &["api-q"]);

        DeploymentReconciler::new(&cluster, "test")
            .release("svc", "api", "img")
            .await
            .unwrap();

        let calls = cluster.calls();
        assert!(!calls.contains(&String::from("list_pods svc qcloud-app=api")));
        assert!(calls.contains(&String::from("delete_pod svc/api-k")));
        assert!(!calls.contains(&String::from("delete_pod svc/api-q")));
    }

    #[tokio::test]
    async fn test_no_pods_is_not_found() {
        let cluster = FakeCluster::new("SH", &["svc"]).with_deployment("svc", "api", "img", Some("Always"));

        let err = DeploymentReconciler::new(&cluster, "test")
            .release("svc", "api", "img")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("pods not found"));
    }

    #[tokio::test]
    async fn test_namespace_fallback_to_environment() {
        let cluster = FakeCluster::new("HZ", &["svc-test"])
            .with_deployment("svc-test", "api", "old", Some("Always"));

        let outcome = DeploymentReconciler::new(&cluster, "test")
            .release("svc", "api", "new")
            .await
            .unwrap();

        assert_eq!(outcome.namespace.as_deref(), Some("svc-test"));
        assert!(cluster.calls().contains(&String::from("patch_image svc-test/api new")));
    }

    #[tokio::test]
    async fn test_missing_namespace_skips() {
        let cluster = FakeCluster::new("HZ", &["other"]);

        let outcome = DeploymentReconciler::new(&cluster, "test")
            .release("svc", "api", "img")
            .await
            .unwrap();

        assert_eq!(outcome.action, ReleaseAction::Skipped);
        assert!(outcome.namespace.is_none());
        assert_eq!(cluster.calls(), vec!["list_namespaces"]);
    }

    #[tokio::test]
    async fn test_missing_deployment_is_not_found() {
        let cluster = FakeCluster::new("HZ", &["svc"]);

        let err = DeploymentReconciler::new(&cluster, "test")
            .release("svc", "api", "img")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ShipyardError::Reconcile(ReconcileError::TargetNotFound { ref what, .. }) if what == "deployment"
        ));
    }

    #[tokio::test]
    async fn test_unreachable_cluster_touches_nothing() {
        let mut cluster = FakeCluster::new("HZ", &["svc"])
            .with_deployment("svc", "api", "img", Some("Always"))
            .with_pods("svc", "app=api", &["api-1"]);
        cluster.fail_list_namespaces = true;

        let err = DeploymentReconciler::new(&cluster, "test")
            .release("svc", "api", "img")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
        assert_eq!(cluster.calls(), vec!["list_namespaces"]);
    }
}
