//! Kubernetes API client.
//!
//! This module defines the [`ClusterClient`] capability used by the release
//! flow and [`KubeApiClient`], its implementation on top of `kube`.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, Namespace, Pod};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ClusterError, Result, ShipyardError};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Image pull policy that forces a fresh pull on every pod start.
pub const PULL_POLICY_ALWAYS: &str = "Always";

/// Operations the release flow needs from a cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Lists namespace names.
    async fn list_namespaces(&self) -> Result<Vec<String>>;

    /// Gets a deployment; fails with `ClusterError::NotFound` if absent.
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment>;

    /// Replaces the image of `container`.
    async fn patch_image(&self, namespace: &str, name: &str, container: &str, image: &str) -> Result<()>;

    /// Sets the pull policy of `container` to `Always`.
    async fn patch_pull_policy_always(&self, namespace: &str, name: &str, container: &str) -> Result<()>;

    /// Lists pod names matching a `key=value` label selector.
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<String>>;

    /// Deletes a pod.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    /// Cluster name, for messages.
    fn cluster_name(&self) -> &str;
}

#[async_trait]
impl ClusterClient for Box<dyn ClusterClient> {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        (**self).list_namespaces().await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        (**self).get_deployment(namespace, name).await
    }

    async fn patch_image(&self, namespace: &str, name: &str, container: &str, image: &str) -> Result<()> {
        (**self).patch_image(namespace, name, container, image).await
    }

    async fn patch_pull_policy_always(&self, namespace: &str, name: &str, container: &str) -> Result<()> {
        (**self).patch_pull_policy_always(namespace, name, container).await
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<String>> {
        (**self).list_pods(namespace, selector).await
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        (**self).delete_pod(namespace, name).await
    }

    fn cluster_name(&self) -> &str {
        (**self).cluster_name()
    }
}

/// Accessors for the container a release manages.
pub trait DeploymentExt {
    /// The first container of the pod template.
    fn primary_container(&self) -> Option<&Container>;

    /// Image of the first container, or empty.
    fn image(&self) -> &str {
        self.primary_container()
            .and_then(|c| c.image.as_deref())
            .unwrap_or_default()
    }

    /// Pull policy of the first container.
    fn image_pull_policy(&self) -> Option<&str> {
        self.primary_container()
            .and_then(|c| c.image_pull_policy.as_deref())
    }
}

impl DeploymentExt for Deployment {
    fn primary_container(&self) -> Option<&Container> {
        self.spec
            .as_ref()?
            .template
            .spec
            .as_ref()?
            .containers
            .first()
    }
}

/// Client for one Kubernetes API server.
#[derive(Clone)]
pub struct KubeApiClient {
    /// Underlying `kube` client.
    client: Client,
    /// Cluster name.
    cluster: String,
}

impl std::fmt::Debug for KubeApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeApiClient")
            .field("cluster", &self.cluster)
            .finish_non_exhaustive()
    }
}

impl KubeApiClient {
    /// Creates a client from a kubeconfig document.
    ///
    /// The document's current context is used, or its first context when
    /// none is marked current. Every user form `kube` understands works:
    /// tokens, token files, client certificates inline or on disk, and
    /// `exec` credential plugins.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidKubeconfig` if the document cannot be
    /// parsed or its credentials cannot be loaded.
    pub async fn from_kubeconfig(cluster: &str, raw: &str) -> Result<Self> {
        let mut kubeconfig = Kubeconfig::from_yaml(raw)
            .map_err(|e| ClusterError::kubeconfig(cluster, e.to_string()))?;

        if kubeconfig.current_context.is_none() {
            kubeconfig.current_context = kubeconfig.contexts.first().map(|c| c.name.clone());
        }

        let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| ClusterError::kubeconfig(cluster, e.to_string()))?;
        config.read_timeout = Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        debug!("Cluster {cluster} API server: {}", config.cluster_url);
        Self::from_config(cluster, config)
    }

    /// Creates a client from a resolved `kube` configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS material cannot be loaded.
    pub fn from_config(cluster: &str, config: Config) -> Result<Self> {
        let client = Client::try_from(config)
            .map_err(|e| ClusterError::kubeconfig(cluster, e.to_string()))?;

        Ok(Self {
            client,
            cluster: cluster.to_string(),
        })
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Maps a `kube` error; `not_found` names the resource for 404 answers.
    fn map_error(&self, error: kube::Error, not_found: Option<(&str, &str, &str)>) -> ShipyardError {
        match error {
            kube::Error::Api(response) => match (response.code, not_found) {
                (401 | 403, _) => ClusterError::AuthenticationFailed {
                    cluster: self.cluster.clone(),
                    message: response.to_string(),
                }
                .into(),
                (404, Some((kind, namespace, name))) => ClusterError::NotFound {
                    kind: kind.to_string(),
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                }
                .into(),
                (status, _) => ClusterError::ApiRequestFailed {
                    cluster: self.cluster.clone(),
                    status,
                    message: response.to_string(),
                }
                .into(),
            },
            kube::Error::Auth(e) => ClusterError::AuthenticationFailed {
                cluster: self.cluster.clone(),
                message: e.to_string(),
            }
            .into(),
            other => ClusterError::network(&self.cluster, other.to_string()).into(),
        }
    }

    /// Strategic-merge patch of one container, keyed by its name.
    async fn patch_container(
        &self,
        namespace: &str,
        name: &str,
        container: serde_json::Value,
    ) -> Result<()> {
        let patch = json!({ "spec": { "template": { "spec": { "containers": [container] } } } });
        self.deployments(namespace)
            .patch(name, &PatchParams::default(), &Patch::Strategic(&patch))
            .await
            .map_err(|e| self.map_error(e, Some(("Deployment", namespace, name))))?;
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for KubeApiClient {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let list = Api::<Namespace>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .map_err(|e| self.map_error(e, None))?;
        Ok(list.items.into_iter().filter_map(|n| n.metadata.name).collect())
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        self.deployments(namespace)
            .get(name)
            .await
            .map_err(|e| self.map_error(e, Some(("Deployment", namespace, name))))
    }

    async fn patch_image(&self, namespace: &str, name: &str, container: &str, image: &str) -> Result<()> {
        info!("[{}] Update deployment image: {namespace}/{name} <- {image}", self.cluster);
        self.patch_container(namespace, name, json!({ "name": container, "image": image }))
            .await
    }

    async fn patch_pull_policy_always(&self, namespace: &str, name: &str, container: &str) -> Result<()> {
        info!("[{}] Set image pull policy Always: {namespace}/{name}", self.cluster);
        self.patch_container(
            namespace,
            name,
            json!({ "name": container, "imagePullPolicy": PULL_POLICY_ALWAYS }),
        )
        .await
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<String>> {
        let list = self
            .pods(namespace)
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(|e| self.map_error(e, None))?;
        Ok(list.items.into_iter().filter_map(|p| p.metadata.name).collect())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        info!("[{}] Delete pod: {namespace}/{name}", self.cluster);
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| self.map_error(e, Some(("Pod", namespace, name))))?;
        Ok(())
    }

    fn cluster_name(&self) -> &str {
        &self.cluster
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn kubeconfig(server: &str, user: &str) -> String {
        format!(
            "apiVersion: v1
kind: Config
clusters:
- name: hz
  cluster:
    server: {server}
contexts:
- name: hz
  context:
    cluster: hz
    user: deployer
users:
- name: deployer
  user:
{user}
"
        )
    }

    async fn client(server: &MockServer) -> KubeApiClient {
        let raw = kubeconfig(&server.uri(), "    token: tok");
        KubeApiClient::from_kubeconfig("HZ", &raw).await.unwrap()
    }

    fn status(code: u16, reason: &str, message: &str) -> serde_json::Value {
        json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": message,
            "reason": reason,
            "code": code
        })
    }

    fn deployment(image: &str) -> serde_json::Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "api", "namespace": "svc" },
            "spec": {
                "selector": { "matchLabels": { "app": "api" } },
                "template": { "spec": { "containers": [
                    { "name": "api", "image": image, "imagePullPolicy": "IfNotPresent" }
                ] } }
            }
        })
    }

    #[tokio::test]
    async fn test_list_namespaces_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "NamespaceList",
                "metadata": {},
                "items": [{ "metadata": { "name": "default" } }, { "metadata": { "name": "svc" } }]
            })))
            .mount(&server)
            .await;

        let names = client(&server).await.list_namespaces().await.unwrap();
        assert_eq!(names, vec!["default", "svc"]);
    }

    #[tokio::test]
    async fn test_get_deployment_reads_primary_container() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apis/apps/v1/namespaces/svc/deployments/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(deployment("registry/api:1")))
            .mount(&server)
            .await;

        let found = client(&server).await.get_deployment("svc", "api").await.unwrap();
        assert_eq!(found.image(), "registry/api:1");
        assert_eq!(found.image_pull_policy(), Some("IfNotPresent"));
        assert_eq!(found.primary_container().map(|c| c.name.as_str()), Some("api"));
    }

    #[tokio::test]
    async fn test_get_deployment_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apis/apps/v1/namespaces/svc/deployments/api"))
            .respond_with(ResponseTemplate::new(404).set_body_json(status(
                404,
                "NotFound",
                "deployments.apps \"api\" not found",
            )))
            .mount(&server)
            .await;

        let err = client(&server).await.get_deployment("svc", "api").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_patch_image_merges_by_container_name() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/apis/apps/v1/namespaces/svc/deployments/api"))
            .and(header("content-type", "application/strategic-merge-patch+json"))
            .and(body_json(json!({ "spec": { "template": { "spec": { "containers": [
                { "name": "api", "image": "registry/api:2" }
            ] } } } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(deployment("registry/api:2")))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .patch_image("svc", "api", "api", "registry/api:2")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_pods_uses_label_selector() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/svc/pods"))
            .and(query_param("labelSelector", "k8s-app=api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "PodList",
                "metadata": {},
                "items": [{ "metadata": { "name": "api-7d9-abc" } }]
            })))
            .mount(&server)
            .await;

        let pods = client(&server).await.list_pods("svc", "k8s-app=api").await.unwrap();
        assert_eq!(pods, vec!["api-7d9-abc"]);
    }

    #[tokio::test]
    async fn test_forbidden_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(403).set_body_json(status(
                403,
                "Forbidden",
                "pods is forbidden",
            )))
            .mount(&server)
            .await;

        let err = client(&server).await.delete_pod("svc", "api-1").await.unwrap_err();
        assert!(matches!(
            err,
            ShipyardError::Cluster(ClusterError::AuthenticationFailed { .. })
        ));
        assert!(err.to_string().contains("pods is forbidden"));
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
    }

    #[tokio::test]
    async fn test_missing_client_certificate_file_is_rejected() {
        let raw = kubeconfig(
            "https://10.0.0.1:6443",
            "    client-certificate: /nonexistent/shipyard/client.crt\n    client-key: /nonexistent/shipyard/client.key",
        );

        let err = KubeApiClient::from_kubeconfig("HZ", &raw).await.unwrap_err();
        assert!(matches!(
            err,
            ShipyardError::Cluster(ClusterError::InvalidKubeconfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_failing_exec_plugin_never_calls_anonymously() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "NamespaceList",
                "metadata": {},
                "items": []
            })))
            .mount(&server)
            .await;

        let raw = kubeconfig(
            &server.uri(),
            "    exec:\n      apiVersion: client.authentication.k8s.io/v1beta1\n      command: shipyard-missing-credential-helper\n      args: [get-token]",
        );

        if let Ok(client) = KubeApiClient::from_kubeconfig("HZ", &raw).await {
            let err = client.list_namespaces().await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
        }
        let received = server.received_requests().await.unwrap_or_default();
        assert!(received.is_empty());
    }

    #[test]
    fn test_deployment_without_containers_has_no_image() {
        let empty = Deployment::default();
        assert!(empty.primary_container().is_none());
        assert_eq!(empty.image(), "");
        assert_eq!(empty.image_pull_policy(), None);
    }
}
