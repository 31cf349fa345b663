//! Config store module.
//!
//! Nacos-compatible config stores hold named config items inside a
//! `(namespace, group)` scope. Two providers are supported:
//! - [`MseConfigStore`]: managed Nacos behind a signed OpenAPI
//! - [`NacosConfigStore`]: a self-hosted Nacos server
//!
//! The local side is a directory of files, read by [`snapshot`].

mod local;
#[cfg(test)]
pub(crate) mod memory;
mod mse;
mod nacos;
mod pager;
mod store;
mod types;

pub use local::{pull_path, snapshot, write_item};
pub use mse::{MseConfigStore, MseCredentials, DEFAULT_ENDPOINT};
pub use nacos::{NacosConfigStore, NacosCredentials};
pub use pager::{Page, PageSource, Pager};
pub use store::ConfigStore;
pub use types::{normalize_path, normalize_type, LocalConfigFile, RemoteConfigItem};

use tracing::info;

use crate::config::StoreCredentials;
use crate::error::Result;

/// Connects to the store the credentials describe.
///
/// For Nacos this performs the login; MSE needs no session.
///
/// # Errors
///
/// Returns an error if the client cannot be created or the login fails.
pub async fn connect(credentials: &StoreCredentials) -> Result<Box<dyn ConfigStore>> {
    let store: Box<dyn ConfigStore> = match credentials {
        StoreCredentials::Mse(c) => Box::new(MseConfigStore::new(c.clone())?),
        StoreCredentials::Nacos(c) => Box::new(NacosConfigStore::login(c).await?),
    };
    info!("Connected to {} config store", store.provider_name());
    Ok(store)
}
