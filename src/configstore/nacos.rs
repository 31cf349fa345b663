//! Self-hosted Nacos config store provider.
//!
//! Logs in once with username and password and passes the returned access
//! token on every call. Mutations answer with a bare `true` body on success.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::error::{Result, StoreError};

use super::pager::{Page, PageSource, Pager};
use super::store::ConfigStore;
use super::types::{normalize_type, RemoteConfigItem};

/// Port used when the host does not carry a scheme.
const DEFAULT_PORT: u16 = 8080;

/// Config API path.
const CONFIGS_PATH: &str = "/nacos/v1/cs/configs";

/// Login API path.
const LOGIN_PATH: &str = "/nacos/v1/auth/users/login";

/// Page size for config listings.
const LIST_PAGE_SIZE: u32 = 200;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Login credentials for one Nacos server.
#[derive(Clone, Serialize, Deserialize)]
pub struct NacosCredentials {
    /// Server host, or a full base URL starting with `http`.
    pub host: String,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
}

impl NacosCredentials {
    /// Base URL of the server.
    #[must_use]
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http") {
            host.to_string()
        } else {
            format!("http://{host}:{DEFAULT_PORT}")
        }
    }
}

/// Nacos config store client holding a logged-in session.
#[derive(Clone)]
pub struct NacosConfigStore {
    /// HTTP client.
    client: Client,
    /// Server base URL.
    base_url: String,
    /// Access token from login.
    access_token: String,
}

impl std::fmt::Debug for NacosConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NacosConfigStore")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    total_count: usize,
    #[serde(default)]
    page_items: Vec<ConfigBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigBody {
    #[serde(default)]
    id: Option<serde_json::Value>,
    data_id: String,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, rename = "type")]
    config_type: Option<String>,
}

impl ConfigBody {
    fn into_item(self, namespace: &str) -> RemoteConfigItem {
        let id = match self.id {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        RemoteConfigItem {
            namespace: namespace.to_string(),
            group: self
                .group
                .filter(|g| !g.is_empty())
                .unwrap_or_else(|| String::from(crate::config::DEFAULT_GROUP)),
            data_id: self.data_id,
            content: self.content,
            config_type: self.config_type.unwrap_or_default(),
            id,
        }
    }
}

impl NacosConfigStore {
    /// Logs in and returns a ready client.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable or rejects the login.
    pub async fn login(credentials: &NacosCredentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::network(format!("Failed to create HTTP client: {e}")))?;
        let base_url = credentials.base_url();

        debug!("Logging in to Nacos at {base_url}");
        let response = client
            .post(format!("{base_url}{LOGIN_PATH}"))
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StoreError::network(format!("Login request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::AuthenticationFailed {
                message: format!("{status}: {message}"),
            }
            .into());
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| StoreError::invalid(format!("Failed to parse login response: {e}")))?;

        info!("Logged in to Nacos at {base_url}");

        Ok(Self {
            client,
            base_url,
            access_token: login.access_token,
        })
    }

    fn configs(&self, method: Method) -> RequestBuilder {
        self.client
            .request(method, format!("{}{CONFIGS_PATH}", self.base_url))
            .query(&[("accessToken", self.access_token.as_str())])
    }

    async fn read_body(response: Response, what: &str) -> Result<(StatusCode, String)> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::network(format!("{what} response unreadable: {e}")))?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StoreError::AuthenticationFailed { message: body }.into());
        }
        Ok((status, body))
    }

    /// Checks a mutation response for the `true` body.
    async fn expect_true(response: Response, operation: &str, data_id: &str) -> Result<()> {
        let (status, body) = Self::read_body(response, operation).await?;
        trace!("{operation} {data_id}: {status} {body}");

        if !status.is_success() {
            return Err(StoreError::api_error(status.as_u16(), body).into());
        }
        if body.trim() != "true" {
            return Err(StoreError::Rejected {
                operation: operation.to_string(),
                data_id: data_id.to_string(),
                message: body,
            }
            .into());
        }
        Ok(())
    }
}

struct NamespaceListing<'a> {
    store: &'a NacosConfigStore,
    namespace: &'a str,
}

#[async_trait]
impl PageSource for NamespaceListing<'_> {
    type Item = RemoteConfigItem;

    async fn fetch_page(&self, page_number: u32, page_size: u32) -> Result<Page<RemoteConfigItem>> {
        let page_no = page_number.to_string();
        let page_size = page_size.to_string();
        let response = self
            .store
            .configs(Method::GET)
            .query(&[
                ("dataId", ""),
                ("group", ""),
                ("appName", ""),
                ("config_tags", ""),
                ("pageNo", page_no.as_str()),
                ("pageSize", page_size.as_str()),
                ("tenant", self.namespace),
                ("search", "accurate"),
            ])
            .send()
            .await
            .map_err(|e| StoreError::network(format!("List request failed: {e}")))?;

        let (status, body) = NacosConfigStore::read_body(response, "list").await?;
        if !status.is_success() {
            return Err(StoreError::api_error(status.as_u16(), body).into());
        }

        let list: ListResponse = serde_json::from_str(&body)
            .map_err(|e| StoreError::invalid(format!("Failed to parse list response: {e}")))?;

        Ok(Page {
            total_count: list.total_count,
            items: list
                .page_items
                .into_iter()
                .map(|c| c.into_item(self.namespace))
                .collect(),
        })
    }
}

#[async_trait]
impl ConfigStore for NacosConfigStore {
    async fn list(&self, namespace: &str) -> Result<Vec<RemoteConfigItem>> {
        debug!("Listing Nacos configs in namespace {namespace}");
        let listing = NamespaceListing {
            store: self,
            namespace,
        };
        Pager::new(&listing, LIST_PAGE_SIZE).collect_all().await
    }

    async fn get(&self, namespace: &str, group: &str, data_id: &str) -> Result<RemoteConfigItem> {
        let response = self
            .configs(Method::GET)
            .query(&[
                ("show", "all"),
                ("dataId", data_id),
                ("group", group),
                ("tenant", namespace),
                ("namespaceId", namespace),
            ])
            .send()
            .await
            .map_err(|e| StoreError::network(format!("Get request failed: {e}")))?;

        let (status, body) = Self::read_body(response, "get").await?;

        if status == StatusCode::NOT_FOUND || (status.is_success() && body.trim().is_empty()) {
            return Err(StoreError::NotFound {
                namespace: namespace.to_string(),
                group: group.to_string(),
                data_id: data_id.to_string(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(StoreError::api_error(status.as_u16(), body).into());
        }

        let config: ConfigBody = serde_json::from_str(&body)
            .map_err(|e| StoreError::invalid(format!("Failed to parse config {data_id}: {e}")))?;
        Ok(config.into_item(namespace))
    }

    async fn create(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        content: &str,
        config_type: &str,
    ) -> Result<()> {
        let response = self
            .configs(Method::POST)
            .form(&[
                ("dataId", data_id),
                ("group", group),
                ("content", content),
                ("type", normalize_type(config_type)),
                ("appName", ""),
                ("tenant", namespace),
                ("namespaceId", namespace),
            ])
            .send()
            .await
            .map_err(|e| StoreError::network(format!("Create request failed: {e}")))?;

        Self::expect_true(response, "create", data_id).await
    }

    async fn update(&self, current: &RemoteConfigItem, content: &str, config_type: &str) -> Result<()> {
        let md5 = format!("{:x}", md5::compute(content.as_bytes()));
        let now = Utc::now().timestamp_millis().to_string();

        let response = self
            .configs(Method::POST)
            .form(&[
                ("id", current.id.as_str()),
                ("dataId", current.data_id.as_str()),
                ("group", current.group.as_str()),
                ("content", content),
                ("md5", md5.as_str()),
                ("type", normalize_type(config_type)),
                ("appName", ""),
                ("tenant", current.namespace.as_str()),
                ("namespaceId", current.namespace.as_str()),
                ("createTime", now.as_str()),
                ("modifyTime", now.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StoreError::network(format!("Update request failed: {e}")))?;

        Self::expect_true(response, "update", &current.data_id).await
    }

    async fn delete(&self, namespace: &str, group: &str, data_id: &str) -> Result<()> {
        let response = self
            .configs(Method::DELETE)
            .query(&[("tenant", namespace), ("group", group), ("dataId", data_id)])
            .form(&[("namespaceId", namespace)])
            .send()
            .await
            .map_err(|e| StoreError::network(format!("Delete request failed: {e}")))?;

        Self::expect_true(response, "delete", data_id).await
    }

    fn provider_name(&self) -> &'static str {
        "nacos"
    }
}
