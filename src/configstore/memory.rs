//! In-memory config store that records calls, for tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{Result, StoreError};

use super::store::ConfigStore;
use super::types::{normalize_type, RemoteConfigItem};

type Key = (String, String, String);

/// Config store backed by a map keyed by `(namespace, group, data_id)`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<Key, RemoteConfigItem>>,
    calls: Mutex<Vec<String>>,
    fail_on: Mutex<Option<(String, String)>>,
    next_id: Mutex<u64>,
    /// Omit content from listings, as the MSE listing does.
    pub list_without_content: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(self, namespace: &str, group: &str, data_id: &str, content: &str, config_type: &str) -> Self {
        self.insert(namespace, group, data_id, content, config_type);
        self
    }

    /// Makes the given operation on the given id fail.
    pub fn fail_on(&self, operation: &str, data_id: &str) {
        *self.fail_on.lock().unwrap() = Some((operation.to_string(), data_id.to_string()));
    }

    /// Every call so far, as `operation data_id` (`list namespace` for listings).
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Mutating calls only.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("list ") && !c.starts_with("get "))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Current items of a namespace, ordered by group and id.
    pub fn items(&self, namespace: &str) -> Vec<RemoteConfigItem> {
        self.items
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.namespace == namespace)
            .cloned()
            .collect()
    }

    fn insert(&self, namespace: &str, group: &str, data_id: &str, content: &str, config_type: &str) {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let item = RemoteConfigItem {
            namespace: namespace.to_string(),
            group: group.to_string(),
            data_id: data_id.to_string(),
            content: Some(content.to_string()),
            config_type: normalize_type(config_type).to_string(),
            id: next_id.to_string(),
        };
        self.items
            .lock()
            .unwrap()
            .insert((namespace.to_string(), group.to_string(), data_id.to_string()), item);
    }

    fn record(&self, operation: &str, data_id: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("{operation} {data_id}"));
        let fail = self
            .fail_on
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|(op, id)| op == operation && id == data_id);
        if fail {
            return Err(StoreError::Rejected {
                operation: operation.to_string(),
                data_id: data_id.to_string(),
                message: String::from("injected failure"),
            }
            .into());
        }
        Ok(())
    }

    fn key(namespace: &str, group: &str, data_id: &str) -> Key {
        (namespace.to_string(), group.to_string(), data_id.to_string())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn list(&self, namespace: &str) -> Result<Vec<RemoteConfigItem>> {
        self.record("list", namespace)?;
        let mut items = self.items(namespace);
        if self.list_without_content {
            for item in &mut items {
                item.content = None;
            }
        }
        Ok(items)
    }

    async fn get(&self, namespace: &str, group: &str, data_id: &str) -> Result<RemoteConfigItem> {
        self.record("get", data_id)?;
        self.items
            .lock()
            .unwrap()
            .get(&Self::key(namespace, group, data_id))
            .cloned()
            .ok_or_else(|| {
                StoreError::NotFound {
                    namespace: namespace.to_string(),
                    group: group.to_string(),
                    data_id: data_id.to_string(),
                }
                .into()
            })
    }

    async fn create(&self, namespace: &str, group: &str, data_id: &str, content: &str, config_type: &str) -> Result<()> {
        self.record("create", data_id)?;
        self.insert(namespace, group, data_id, content, config_type);
        Ok(())
    }

    async fn update(&self, current: &RemoteConfigItem, content: &str, config_type: &str) -> Result<()> {
        self.record("update", &current.data_id)?;
        let mut items = self.items.lock().unwrap();
        let key = Self::key(&current.namespace, &current.group, &current.data_id);
        let item = items.get_mut(&key).ok_or_else(|| StoreError::NotFound {
            namespace: current.namespace.clone(),
            group: current.group.clone(),
            data_id: current.data_id.clone(),
        })?;
        item.content = Some(content.to_string());
        item.config_type = normalize_type(config_type).to_string();
        Ok(())
    }

    async fn delete(&self, namespace: &str, group: &str, data_id: &str) -> Result<()> {
        self.record("delete", data_id)?;
        self.items
            .lock()
            .unwrap()
            .remove(&Self::key(namespace, group, data_id));
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
