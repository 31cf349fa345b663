//! MSE (managed Nacos) config store provider.
//!
//! Calls the MSE OpenAPI with RPC-style actions, each request signed with
//! the static access-key pair using the ACS3-HMAC-SHA256 scheme. The API is
//! stateless: there is no session to establish.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{header, Client, Method, Url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{Result, StoreError};

use super::pager::{Page, PageSource, Pager};
use super::store::ConfigStore;
use super::types::{normalize_type, RemoteConfigItem};

/// Endpoint used when the credentials do not name one.
pub const DEFAULT_ENDPOINT: &str = "mse.cn-shanghai.aliyuncs.com";

/// OpenAPI version of the MSE product.
const API_VERSION: &str = "2019-05-31";

/// Signature algorithm name.
const SIGNATURE_ALGORITHM: &str = "ACS3-HMAC-SHA256";

/// Page size for config listings.
const LIST_PAGE_SIZE: u32 = 200;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

type HmacSha256 = Hmac<Sha256>;

/// Access-key credentials for one MSE instance.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MseCredentials {
    /// Access key id.
    pub access_key_id: String,
    /// Access key secret.
    pub access_key_secret: String,
    /// MSE instance id.
    pub instance_id: String,
    /// OpenAPI endpoint host; defaults to [`DEFAULT_ENDPOINT`].
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// MSE config store client.
#[derive(Clone)]
pub struct MseConfigStore {
    /// HTTP client.
    client: Client,
    /// Endpoint base URL.
    base_url: Url,
    /// Credentials.
    credentials: MseCredentials,
}

impl std::fmt::Debug for MseConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MseConfigStore")
            .field("base_url", &self.base_url.as_str())
            .field("instance_id", &self.credentials.instance_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListResponse {
    #[serde(default)]
    configurations: Vec<ConfigBody>,
    #[serde(default)]
    total_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetResponse {
    #[serde(default)]
    configuration: Option<ConfigBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MutationResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConfigBody {
    data_id: String,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, rename = "Type")]
    config_type: Option<String>,
}

impl ConfigBody {
    fn into_item(self, namespace: &str) -> RemoteConfigItem {
        let id = match self.id {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
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

impl MseConfigStore {
    /// Creates a client for the endpoint named in the credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid host or the HTTP
    /// client cannot be created.
    pub fn new(credentials: MseCredentials) -> Result<Self> {
        let endpoint = credentials
            .endpoint
            .clone()
            .unwrap_or_else(|| String::from(DEFAULT_ENDPOINT));
        let base_url = if endpoint.starts_with("http") {
            endpoint
        } else {
            format!("https://{endpoint}")
        };
        Self::with_base_url(credentials, &base_url)
    }

    /// Creates a client for an explicit base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// created.
    pub fn with_base_url(credentials: MseCredentials, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StoreError::network(format!("Invalid MSE endpoint {base_url}: {e}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    /// Host header value the request will carry.
    fn host(&self) -> String {
        let host = self.base_url.host_str().unwrap_or_default();
        match self.base_url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Executes one signed OpenAPI action.
    ///
    /// Read actions send parameters in the query string, write actions as a
    /// form body.
    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        action: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let mut params: Vec<(&str, &str)> = params.to_vec();
        params.push(("InstanceId", self.credentials.instance_id.as_str()));
        params.sort_unstable();

        let encoded = canonical_query(&params);
        let (query, body) = if method == Method::GET {
            (encoded, String::new())
        } else {
            (String::new(), encoded)
        };

        let date = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let nonce = uuid::Uuid::new_v4().to_string();
        let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));

        let mut signed: Vec<(&str, String)> = vec![
            ("host", self.host()),
            ("x-acs-action", action.to_string()),
            ("x-acs-content-sha256", payload_hash.clone()),
            ("x-acs-date", date),
            ("x-acs-signature-nonce", nonce),
            ("x-acs-version", API_VERSION.to_string()),
        ];
        if !body.is_empty() {
            signed.push((
                "content-type",
                String::from("application/x-www-form-urlencoded"),
            ));
        }
        signed.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let authorization = sign_request(
            &self.credentials,
            method.as_str(),
            &query,
            &signed,
            &payload_hash,
        )?;

        let mut url = self.base_url.clone();
        url.set_path("/");
        url.set_query((!query.is_empty()).then_some(query.as_str()));
        trace!("{method} {action} -> {url}");

        let mut request = self
            .client
            .request(method, url)
            .header(header::AUTHORIZATION, authorization);
        for (name, value) in &signed {
            if *name != "host" {
                request = request.header(*name, value);
            }
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::network(format!("{action} request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StoreError::network(format!("{action} response unreadable: {e}")))?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(StoreError::AuthenticationFailed {
                message: error_message(&text),
            }
            .into());
        }

        if !status.is_success() {
            return Err(StoreError::api_error(status.as_u16(), error_message(&text)).into());
        }

        serde_json::from_str(&text)
            .map_err(|e| StoreError::invalid(format!("Failed to parse {action} response: {e}")).into())
    }

    async fn mutate(&self, action: &str, data_id: &str, params: &[(&str, &str)]) -> Result<()> {
        let response: MutationResponse = self.call(Method::POST, action, params).await?;

        if response.success == Some(false) {
            return Err(StoreError::Rejected {
                operation: action.to_string(),
                data_id: data_id.to_string(),
                message: response.message.unwrap_or_default(),
            }
            .into());
        }
        Ok(())
    }
}

/// One namespace listing, paged through [`Pager`].
struct NamespaceListing<'a> {
    store: &'a MseConfigStore,
    namespace: &'a str,
}

#[async_trait]
impl PageSource for NamespaceListing<'_> {
    type Item = RemoteConfigItem;

    async fn fetch_page(&self, page_number: u32, page_size: u32) -> Result<Page<RemoteConfigItem>> {
        let page_num = page_number.to_string();
        let page_size = page_size.to_string();
        let response: ListResponse = self
            .store
            .call(
                Method::GET,
                "ListNacosConfigs",
                &[
                    ("NamespaceId", self.namespace),
                    ("PageNum", page_num.as_str()),
                    ("PageSize", page_size.as_str()),
                ],
            )
            .await?;

        Ok(Page {
            total_count: response.total_count,
            items: response
                .configurations
                .into_iter()
                .map(|c| c.into_item(self.namespace))
                .collect(),
        })
    }
}

#[async_trait]
impl ConfigStore for MseConfigStore {
    async fn list(&self, namespace: &str) -> Result<Vec<RemoteConfigItem>> {
        debug!("Listing MSE configs in namespace {namespace}");
        let listing = NamespaceListing {
            store: self,
            namespace,
        };
        Pager::new(&listing, LIST_PAGE_SIZE).collect_all().await
    }

    async fn get(&self, namespace: &str, group: &str, data_id: &str) -> Result<RemoteConfigItem> {
        let result: Result<GetResponse> = self
            .call(
                Method::GET,
                "GetNacosConfig",
                &[
                    ("DataId", data_id),
                    ("Group", group),
                    ("NamespaceId", namespace),
                ],
            )
            .await;

        let not_found = || StoreError::NotFound {
            namespace: namespace.to_string(),
            group: group.to_string(),
            data_id: data_id.to_string(),
        };

        match result {
            Ok(response) => response
                .configuration
                .map(|c| c.into_item(namespace))
                .ok_or_else(|| not_found().into()),
            Err(crate::error::ShipyardError::Store(StoreError::ApiRequestFailed { status: 404, .. })) => {
                Err(not_found().into())
            }
            Err(e) => Err(e),
        }
    }

    async fn create(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        content: &str,
        config_type: &str,
    ) -> Result<()> {
        self.mutate(
            "CreateNacosConfig",
            data_id,
            &[
                ("Content", content),
                ("DataId", data_id),
                ("Group", group),
                ("NamespaceId", namespace),
                ("Type", normalize_type(config_type)),
            ],
        )
        .await
    }

    async fn update(&self, current: &RemoteConfigItem, content: &str, config_type: &str) -> Result<()> {
        self.mutate(
            "UpdateNacosConfig",
            &current.data_id,
            &[
                ("Content", content),
                ("DataId", current.data_id.as_str()),
                ("Group", current.group.as_str()),
                ("NamespaceId", current.namespace.as_str()),
                ("Type", normalize_type(config_type)),
            ],
        )
        .await
    }

    async fn delete(&self, namespace: &str, group: &str, data_id: &str) -> Result<()> {
        self.mutate(
            "DeleteNacosConfig",
            data_id,
            &[
                ("DataId", data_id),
                ("Group", group),
                ("NamespaceId", namespace),
            ],
        )
        .await
    }

    fn provider_name(&self) -> &'static str {
        "mse"
    }
}

/// Percent-encodes sorted parameters as `k=v&k=v` (RFC 3986).
fn canonical_query(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Builds the `Authorization` header for a request.
///
/// `headers` must be sorted by lowercase name.
fn sign_request(
    credentials: &MseCredentials,
    method: &str,
    canonical_query: &str,
    headers: &[(&str, String)],
    payload_hash: &str,
) -> Result<String> {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{}\n", value.trim()))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{method}\n/\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    );
    let string_to_sign = format!(
        "{SIGNATURE_ALGORITHM}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let mut mac = HmacSha256::new_from_slice(credentials.access_key_secret.as_bytes())
        .map_err(|e| StoreError::AuthenticationFailed {
            message: format!("Unusable access key secret: {e}"),
        })?;
    mac.update(string_to_sign.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(format!(
        "{SIGNATURE_ALGORITHM} Credential={},SignedHeaders={signed_headers},Signature={signature}",
        credentials.access_key_id
    ))
}

/// Extracts the most useful message from an error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body).map_or_else(
        |_| body.to_string(),
        |e| match (e.code, e.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (None, Some(message)) => message,
            (Some(code), None) => code,
            (None, None) => body.to_string(),
        },
    )
}
