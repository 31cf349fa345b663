//! Diff engine for comparing the local config directory with a store
//! namespace.
//!
//! Items are matched by config id only. Every remote item whose id has a
//! local counterpart is an update candidate, whatever its group; the
//! candidate is classified once its current content has been fetched.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::configstore::{LocalConfigFile, RemoteConfigItem};

/// Engine for matching local files against remote items.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffEngine;

/// Result of matching by config id, before any content comparison.
#[derive(Debug, Default)]
pub struct IdMatch {
    /// Local files with no remote item of the same id.
    pub adds: Vec<LocalConfigFile>,
    /// Local files paired with each remote item sharing their id.
    pub matched: Vec<(LocalConfigFile, RemoteConfigItem)>,
    /// Remote items with no local file of the same id.
    pub deletes: Vec<RemoteConfigItem>,
}

/// Type of change for one config item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Item must be created.
    Create,
    /// Item exists with different content or type.
    Update,
    /// Item must be deleted.
    Delete,
    /// Item already matches the local file.
    NoChange,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Partitions local files and remote items by config id.
    ///
    /// Output order follows input order, so a sorted snapshot yields a
    /// sorted plan.
    #[must_use]
    pub fn match_ids(&self, local: &[LocalConfigFile], remote: &[RemoteConfigItem]) -> IdMatch {
        let local_by_id: HashMap<&str, &LocalConfigFile> =
            local.iter().map(|f| (f.data_id.as_str(), f)).collect();
        let remote_ids: HashSet<&str> = remote.iter().map(|i| i.data_id.as_str()).collect();

        let mut result = IdMatch::default();

        for file in local {
            if !remote_ids.contains(file.data_id.as_str()) {
                debug!("Config {} is new", file.data_id);
                result.adds.push(file.clone());
            }
        }

        for item in remote {
            match local_by_id.get(item.data_id.as_str()) {
                Some(file) => result.matched.push(((*file).clone(), item.clone())),
                None => {
                    debug!("Config {}/{} has no local file", item.group, item.data_id);
                    result.deletes.push(item.clone());
                }
            }
        }

        result
    }

    /// Classifies a matched pair once the current item has been fetched.
    #[must_use]
    pub fn classify(&self, local: &LocalConfigFile, current: &RemoteConfigItem) -> ChangeType {
        if local.matches(current) {
            ChangeType::NoChange
        } else {
            ChangeType::Update
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}
