//! Typed settings derived from the release context.
//!
//! Each command reads the variables it needs once, up front, so that a
//! missing value fails the run before any remote call is made.

use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

use crate::configstore::{MseCredentials, NacosCredentials};
use crate::error::{ConfigError, Result};
use crate::release::ImageRewriteTable;

use super::context::ReleaseContext;

/// Prefix of the per-instance config store credential variables.
pub const STORE_CREDENTIALS_PREFIX: &str = "GS_RELEASE_NACOS_";

/// Variable holding the per-cluster image rewrite table.
pub const IMAGE_REWRITE_KEY: &str = "GL_IMAGE_NAME_CONFIG";

/// Group used for created configs when none is configured.
pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";

/// Settings for a Kubernetes release.
#[derive(Debug, Clone)]
pub struct ReleaseSettings {
    /// Comma-separated cluster names.
    pub clusters: String,
    /// Environment name (e.g. `test`, `prod`).
    pub environment: String,
    /// Comma-separated namespace names.
    pub namespaces: String,
    /// Service (deployment) name.
    pub service_name: String,
    /// Desired image.
    pub image: String,
    /// Per-cluster image rewrites.
    pub image_rewrites: ImageRewriteTable,
}

impl ReleaseSettings {
    /// Reads release settings from the context.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or the image
    /// rewrite table is malformed.
    pub async fn from_context(ctx: &ReleaseContext) -> Result<Self> {
        let clusters = ctx.require("P_COLONY").await?.to_uppercase();
        let environment = ctx
            .get_first(&["colonyEnv", "P_COLONY_ENV"])
            .await
            .ok_or_else(|| ConfigError::missing("colonyEnv"))?;

        let env_namespace_key = format!("P_NAMESPACE_{}", environment.to_uppercase());
        let namespaces = ctx
            .get_first(&[env_namespace_key.as_str(), "P_NAMESPACE"])
            .await
            .ok_or_else(|| ConfigError::missing("P_NAMESPACE"))?;

        let image = ctx.require("P_IMAGE_NAME").await?;
        let service_name = ctx.require("P_SERVICE_NAME").await?;

        let image_rewrites = match ctx.get(IMAGE_REWRITE_KEY).await {
            Some(raw) => ImageRewriteTable::parse(&raw)?,
            None => ImageRewriteTable::default(),
        };

        debug!("Release settings: clusters={clusters} env={environment} namespaces={namespaces}");

        Ok(Self {
            clusters,
            environment,
            namespaces,
            service_name,
            image,
            image_rewrites,
        })
    }
}

/// Supported config store providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Managed Nacos behind the MSE OpenAPI, signed with an access-key pair.
    Mse,
    /// Self-hosted Nacos HTTP API with username/password login.
    Nacos,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ALIYUN" | "MSE" => Ok(Self::Mse),
            "TENCENT" | "NACOS" => Ok(Self::Nacos),
            _ => Err(ConfigError::UnknownProvider {
                provider: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Mse => "mse",
            Self::Nacos => "nacos",
        };
        write!(f, "{s}")
    }
}

/// Credentials for one config store instance.
#[derive(Clone)]
pub enum StoreCredentials {
    /// Access-key pair for the MSE OpenAPI.
    Mse(MseCredentials),
    /// Login for a Nacos server.
    Nacos(NacosCredentials),
}

impl std::fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mse(c) => write!(f, "Mse({})", c.instance_id),
            Self::Nacos(c) => write!(f, "Nacos({})", c.host),
        }
    }
}

impl StoreCredentials {
    /// Parses the credential JSON document for the given provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid for the provider.
    pub fn parse(provider: ProviderKind, raw: &str, location: &str) -> Result<Self> {
        let parsed = match provider {
            ProviderKind::Mse => serde_json::from_str(raw).map(Self::Mse),
            ProviderKind::Nacos => serde_json::from_str(raw).map(Self::Nacos),
        };
        parsed.map_err(|e| ConfigError::parse(format!("{provider} credential JSON: {e}"), location).into())
    }

    /// Returns the provider of these credentials.
    #[must_use]
    pub const fn provider(&self) -> ProviderKind {
        match self {
            Self::Mse(_) => ProviderKind::Mse,
            Self::Nacos(_) => ProviderKind::Nacos,
        }
    }
}

/// Settings for syncing a local config directory to a config store.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Store namespace (tenant) to sync into.
    pub namespace: String,
    /// Local directory holding the config files.
    pub directory: PathBuf,
    /// Group used for created configs.
    pub group: String,
    /// Store credentials, which also select the provider.
    pub credentials: StoreCredentials,
}

impl SyncSettings {
    /// Reads sync settings from the context.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, the provider
    /// kind is unknown or the credential document is malformed.
    pub async fn from_context(ctx: &ReleaseContext) -> Result<Self> {
        let provider: ProviderKind = ctx.require("P_SERVICE_TYPE").await?.parse()?;
        let instance = ctx.require("P_INSTANCE_ID").await?;
        let namespace = ctx.require("P_INSTANCE_NAMESPACE").await?;
        let work_dir = ctx.require("CI_PROJECT_DIR").await?;
        let config_dir = ctx.require("P_CONFIG_DIRECTORY").await?;
        let group = ctx
            .get("P_CONFIG_GROUP")
            .await
            .unwrap_or_else(|| String::from(DEFAULT_GROUP));

        let credentials_key = format!("{STORE_CREDENTIALS_PREFIX}{instance}");
        let raw = ctx.require(&credentials_key).await?;
        let credentials = StoreCredentials::parse(provider, &raw, &credentials_key)?;

        Ok(Self {
            namespace,
            directory: PathBuf::from(work_dir).join(config_dir),
            group,
            credentials,
        })
    }
}
