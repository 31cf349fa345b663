//! Remote key/value variable service.
//!
//! CI jobs keep shared variables and credentials on a small key/value
//! service instead of in the pipeline definition. This module provides the
//! [`VariableSource`] seam and its HTTP implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::error::{KeyValueError, Result, ShipyardError};

/// Variable holding the key/value service base URL.
pub const SERVER_URL_KEY: &str = "GL_SERVER_URL";

/// Variable holding the key/value service access token.
pub const SERVER_TOKEN_KEY: &str = "GL_SERVER_ACCESS_TOKEN";

/// Base URL used when `GL_SERVER_URL` is not set.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

/// Value prefix that makes [`KeyValueClient::push`] upload a file's content.
pub const FILE_VALUE_PREFIX: &str = "#file://";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A source of named variables.
#[async_trait]
pub trait VariableSource: Send + Sync {
    /// Looks up a single variable. `Ok(None)` means not found.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Lists all variables whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<(String, String)>>;
}

/// A variable as stored on the key/value service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VariableEntry {
    /// Variable name.
    pub key: String,
    /// Stored value.
    #[serde(default)]
    pub value: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

/// HTTP client for the key/value variable service.
#[derive(Debug, Clone)]
pub struct KeyValueClient {
    /// HTTP client.
    client: Client,
    /// Service base URL.
    base_url: String,
    /// Access token sent as `access-token`.
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PairResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PairListResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<VariableEntry>,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
}

impl KeyValueClient {
    /// Creates a client for the given service.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, access_token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ShipyardError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        })
    }

    /// Lists stored variables with their descriptions.
    ///
    /// An empty prefix lists every variable.
    ///
    /// # Errors
    ///
    /// Returns `KeyValueError` if the service is unreachable or answers
    /// with an unexpected body.
    pub async fn entries(&self, prefix: &str) -> Result<Vec<VariableEntry>> {
        let path = if prefix.is_empty() {
            String::from("/pair/list")
        } else {
            format!("/pair/list/{prefix}")
        };
        let response: PairListResponse = self.fetch(&path).await?;

        if !response.success {
            return Ok(vec![]);
        }
        Ok(response.data)
    }

    /// Stores a variable, replacing any previous value.
    ///
    /// A value of the form `#file://<path>` uploads the content of that
    /// file instead.
    ///
    /// # Errors
    ///
    /// Returns an IO error if a referenced file cannot be read, and
    /// `KeyValueError` if the service fails or refuses the write.
    pub async fn push(&self, key: &str, value: &str, description: &str) -> Result<()> {
        let value = match value.strip_prefix(FILE_VALUE_PREFIX) {
            Some(path) => tokio::fs::read_to_string(path).await?,
            None => value.to_string(),
        };

        self.write(
            "save",
            key,
            &json!({ "key": key, "value": value, "description": description }),
        )
        .await?;
        info!("Saved variable {key}");
        Ok(())
    }

    /// Removes a variable.
    ///
    /// # Errors
    ///
    /// Returns `KeyValueError` if the service fails or refuses the removal.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.write("remove", key, &json!({ "key": key })).await?;
        info!("Removed variable {key}");
        Ok(())
    }

    async fn write(&self, operation: &str, key: &str, body: &serde_json::Value) -> Result<()> {
        let path = format!("/pair/{operation}");
        let url = format!("{}{path}", self.base_url);
        trace!("POST {url}");

        let response = self
            .client
            .post(&url)
            .query(&[("access-token", self.access_token.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| request_failed(&path, &e))?;
        let result: WriteResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(&path, &e))?;

        if !result.success {
            return Err(KeyValueError::Rejected {
                operation: operation.to_string(),
                key: key.to_string(),
                message: result.message,
            }
            .into());
        }
        Ok(())
    }

    async fn fetch<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        trace!("GET {url}");

        let response = self
            .client
            .get(&url)
            .query(&[("access-token", self.access_token.as_str())])
            .send()
            .await
            .map_err(|e| request_failed(path, &e))?;

        response
            .json::<T>()
            .await
            .map_err(|e| invalid_response(path, &e))
    }
}

fn request_failed(path: &str, error: &reqwest::Error) -> ShipyardError {
    KeyValueError::RequestFailed {
        path: path.to_string(),
        message: error.to_string(),
    }
    .into()
}

fn invalid_response(path: &str, error: &reqwest::Error) -> ShipyardError {
    KeyValueError::InvalidResponse {
        path: path.to_string(),
        message: error.to_string(),
    }
    .into()
}

#[async_trait]
impl VariableSource for KeyValueClient {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let response: PairResponse = self.fetch(&format!("/pair/{key}")).await?;
        let success = response.success;
        debug!("Key/value lookup {key}: found={success}");

        Ok(response.data.filter(|value| success && !value.is_empty()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .entries(prefix)
            .await?
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_found_and_missing() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/pair/P_COLONY"))
            .and(query_param("access-token", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": "prod"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/pair/MISSING"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "data": ""
            })))
            .mount(&server)
            .await;

        let client = KeyValueClient::new(&server.uri(), "secret").expect("client");

        assert_eq!(
            client.get("P_COLONY").await.expect("lookup"),
            Some(String::from("prod"))
        );
        assert_eq!(client.get("MISSING").await.expect("lookup"), None);
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/pair/list/GL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [
                    { "key": "GL_IMAGE_NAME_CONFIG", "value": "{}" },
                    { "key": "GL_MESSAGE_CP_WECHAT_ROBOT", "value": "http://robot" }
                ]
            })))
            .mount(&server)
            .await;

        let client = KeyValueClient::new(&server.uri(), "").expect("client");
        let entries = client.list("GL").await.expect("list");

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "GL_IMAGE_NAME_CONFIG");
    }

    #[tokio::test]
    async fn test_entries_keep_descriptions() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/pair/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [{ "key": "GS_TOKEN", "value": "t", "description": "deploy token" }]
            })))
            .mount(&server)
            .await;

        let client = KeyValueClient::new(&server.uri(), "").expect("client");
        let entries = client.entries("").await.expect("entries");

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, "deploy token");
    }

    #[tokio::test]
    async fn test_push_posts_value() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/pair/save"))
            .and(query_param("access-token", "secret"))
            .and(body_json(json!({
                "key": "GL_REGION",
                "value": "cn-hangzhou",
                "description": "default region"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;

        let client = KeyValueClient::new(&server.uri(), "secret").expect("client");
        client
            .push("GL_REGION", "cn-hangzhou", "default region")
            .await
            .expect("push");
    }

    #[tokio::test]
    async fn test_push_reads_file_value() {
        let server = MockServer::start().await;
        let dir = tempfile::TempDir::new().expect("temp dir");
        let file = dir.path().join("kubeconfig");
        std::fs::write(&file, "apiVersion: v1\n").expect("write file");

        Mock::given(method("POST"))
            .and(path("/pair/save"))
            .and(body_json(json!({
                "key": "GS_RELEASE_KUBERNETES_HZ",
                "value": "apiVersion: v1\n",
                "description": ""
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;

        let client = KeyValueClient::new(&server.uri(), "").expect("client");
        let value = format!("{FILE_VALUE_PREFIX}{}", file.display());
        client
            .push("GS_RELEASE_KUBERNETES_HZ", &value, "")
            .await
            .expect("push");
    }

    #[tokio::test]
    async fn test_push_missing_file_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(0)
            .mount(&server)
            .await;

        let client = KeyValueClient::new(&server.uri(), "").expect("client");
        let err = client
            .push("GL_X", "#file:///nonexistent/shipyard/value", "")
            .await
            .unwrap_err();
        assert!(matches!(err, ShipyardError::Io(_)));
    }

    #[tokio::test]
    async fn test_remove_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/pair/remove"))
            .and(body_json(json!({ "key": "GL_REGION" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "message": "key is locked"
            })))
            .mount(&server)
            .await;

        let client = KeyValueClient::new(&server.uri(), "").expect("client");
        let err = client.remove("GL_REGION").await.unwrap_err();

        assert!(matches!(err, ShipyardError::KeyValue(KeyValueError::Rejected { .. })));
        assert!(err.to_string().contains("key is locked"));
    }

    #[tokio::test]
    async fn test_transport_failures_are_remote_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pair/GL_REGION"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let client = KeyValueClient::new(&server.uri(), "").expect("client");
        let err = client.get("GL_REGION").await.unwrap_err();
        assert!(matches!(err, ShipyardError::KeyValue(KeyValueError::InvalidResponse { .. })));
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);

        let unreachable = KeyValueClient::new("http://127.0.0.1:9", "").expect("client");
        let err = unreachable.list("GL").await.unwrap_err();
        assert!(matches!(err, ShipyardError::KeyValue(KeyValueError::RequestFailed { .. })));
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
    }
}
