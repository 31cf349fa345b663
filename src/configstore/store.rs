//! Config store trait definition.
//!
//! This module defines the common interface for config store providers.

use async_trait::async_trait;

use crate::error::Result;

use super::types::RemoteConfigItem;

/// Trait for config store providers.
///
/// Nothing outside a provider may depend on provider-specific fields; the
/// reconciler sees only these five operations.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Lists every item in a namespace, draining all pages.
    async fn list(&self, namespace: &str) -> Result<Vec<RemoteConfigItem>>;

    /// Gets one item with its content.
    ///
    /// Fails with `StoreError::NotFound` if the item does not exist.
    async fn get(&self, namespace: &str, group: &str, data_id: &str) -> Result<RemoteConfigItem>;

    /// Creates an item.
    async fn create(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        content: &str,
        config_type: &str,
    ) -> Result<()>;

    /// Overwrites an existing item.
    ///
    /// `current` must come from [`ConfigStore::get`]: providers key the
    /// write on its provider-assigned id.
    async fn update(&self, current: &RemoteConfigItem, content: &str, config_type: &str) -> Result<()>;

    /// Deletes an item.
    async fn delete(&self, namespace: &str, group: &str, data_id: &str) -> Result<()>;

    /// Gets the provider name.
    fn provider_name(&self) -> &'static str;
}

#[async_trait]
impl ConfigStore for Box<dyn ConfigStore> {
    async fn list(&self, namespace: &str) -> Result<Vec<RemoteConfigItem>> {
        (**self).list(namespace).await
    }

    async fn get(&self, namespace: &str, group: &str, data_id: &str) -> Result<RemoteConfigItem> {
        (**self).get(namespace, group, data_id).await
    }

    async fn create(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        content: &str,
        config_type: &str,
    ) -> Result<()> {
        (**self)
            .create(namespace, group, data_id, content, config_type)
            .await
    }

    async fn update(&self, current: &RemoteConfigItem, content: &str, config_type: &str) -> Result<()> {
        (**self).update(current, content, config_type).await
    }

    async fn delete(&self, namespace: &str, group: &str, data_id: &str) -> Result<()> {
        (**self).delete(namespace, group, data_id).await
    }

    fn provider_name(&self) -> &'static str {
        (**self).provider_name()
    }
}
