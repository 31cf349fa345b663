//! Scriptable cluster client that records calls, for tests.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{ClusterError, Result};

use super::client::ClusterClient;

/// In-memory cluster.
///
/// Calls are appended to a shared log so tests can inspect them after the
/// client has been handed out as a `Box<dyn ClusterClient>`.
#[derive(Debug, Clone, Default)]
pub struct FakeCluster {
    pub name: String,
    pub namespaces: Vec<String>,
    /// `(namespace, name) -> (image, pull policy)`.
    pub deployments: HashMap<(String, String), (String, Option<String>)>,
    /// `(namespace, selector) -> pod names`.
    pub pods: HashMap<(String, String), Vec<String>>,
    pub fail_list_namespaces: bool,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl FakeCluster {
    pub fn new(name: &str, namespaces: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            namespaces: namespaces.iter().map(|n| (*n).to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_deployment(mut self, namespace: &str, name: &str, image: &str, policy: Option<&str>) -> Self {
        self.deployments.insert(
            (namespace.to_string(), name.to_string()),
            (image.to_string(), policy.map(String::from)),
        );
        self
    }

    pub fn with_pods(mut self, namespace: &str, selector: &str, pods: &[&str]) -> Self {
        self.pods.insert(
            (namespace.to_string(), selector.to_string()),
            pods.iter().map(|p| (*p).to_string()).collect(),
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        self.record(String::from("list_namespaces"));
        if self.fail_list_namespaces {
            return Err(ClusterError::network(&self.name, "connection refused").into());
        }
        Ok(self.namespaces.clone())
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        self.record(format!("get_deployment {namespace}/{name}"));
        let (image, policy) = self
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| ClusterError::NotFound {
                kind: String::from("Deployment"),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;
        Ok(Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: name.to_string(),
                            image: Some(image.clone()),
                            image_pull_policy: policy.clone(),
                            ..Container::default()
                        }],
                        ..PodSpec::default()
                    }),
                    ..PodTemplateSpec::default()
                },
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        })
    }

    async fn patch_image(&self, namespace: &str, name: &str, _container: &str, image: &str) -> Result<()> {
        self.record(format!("patch_image {namespace}/{name} {image}"));
        Ok(())
    }

    async fn patch_pull_policy_always(&self, namespace: &str, name: &str, _container: &str) -> Result<()> {
        self.record(format!("patch_pull_policy {namespace}/{name}"));
        Ok(())
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<String>> {
        self.record(format!("list_pods {namespace} {selector}"));
        Ok(self
            .pods
            .get(&(namespace.to_string(), selector.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.record(format!("delete_pod {namespace}/{name}"));
        Ok(())
    }

    fn cluster_name(&self) -> &str {
        &self.name
    }
}
