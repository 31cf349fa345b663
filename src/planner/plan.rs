//! Resolved sync plan types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::configstore::{LocalConfigFile, RemoteConfigItem};

use super::diff::ChangeType;

/// A resolved plan for one namespace.
///
/// Every local file and every remote item lands in exactly one of the four
/// sets: `adds` (local only), `updates` or `unchanged` (both sides), and
/// `deletes` (remote only).
#[derive(Debug, Clone)]
pub struct DiffPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Target namespace.
    pub namespace: String,
    /// Group used for created items.
    pub group: String,
    /// Files to create.
    pub adds: Vec<LocalConfigFile>,
    /// Items to overwrite.
    pub updates: Vec<PlannedUpdate>,
    /// Items already matching their local file.
    pub unchanged: Vec<RemoteConfigItem>,
    /// Items to delete.
    pub deletes: Vec<RemoteConfigItem>,
}

/// An item to overwrite, with the state it was fetched in.
#[derive(Debug, Clone)]
pub struct PlannedUpdate {
    /// Desired local file.
    pub local: LocalConfigFile,
    /// Current remote item, as returned by `get`.
    pub current: RemoteConfigItem,
}

/// One row of a plan, for display.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedAction {
    /// Kind of change.
    pub change: ChangeType,
    /// Group of the item.
    pub group: String,
    /// Config id.
    pub data_id: String,
    /// Config type.
    pub config_type: String,
}

impl DiffPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new(namespace: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            namespace: namespace.into(),
            group: group.into(),
            adds: Vec::new(),
            updates: Vec::new(),
            unchanged: Vec::new(),
            deletes: Vec::new(),
        }
    }

    /// Returns true if applying the plan would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Number of mutating operations.
    #[must_use]
    pub fn total_changes(&self) -> usize {
        self.adds.len() + self.updates.len() + self.deletes.len()
    }

    /// Rows in apply order (creates, updates, deletes), then unchanged items.
    #[must_use]
    pub fn actions(&self) -> Vec<PlannedAction> {
        let creates = self.adds.iter().map(|f| PlannedAction {
            change: ChangeType::Create,
            group: self.group.clone(),
            data_id: f.data_id.clone(),
            config_type: f.config_type.clone(),
        });
        let updates = self.updates.iter().map(|u| PlannedAction {
            change: ChangeType::Update,
            group: u.current.group.clone(),
            data_id: u.local.data_id.clone(),
            config_type: u.local.config_type.clone(),
        });
        let deletes = self
            .deletes
            .iter()
            .map(|i| Self::remote_action(ChangeType::Delete, i));
        let unchanged = self
            .unchanged
            .iter()
            .map(|i| Self::remote_action(ChangeType::NoChange, i));

        creates.chain(updates).chain(deletes).chain(unchanged).collect()
    }

    fn remote_action(change: ChangeType, item: &RemoteConfigItem) -> PlannedAction {
        PlannedAction {
            change,
            group: item.group.clone(),
            data_id: item.data_id.clone(),
            config_type: item.config_type.clone(),
        }
    }
}

impl std::fmt::Display for DiffPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} to create, {} to update, {} to delete, {} unchanged",
            self.namespace,
            self.adds.len(),
            self.updates.len(),
            self.deletes.len(),
            self.unchanged.len()
        )
    }
}
