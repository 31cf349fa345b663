//! Reconciler for config store namespaces.
//!
//! Makes a store namespace mirror a local config directory: compute the
//! plan from the current remote state, then apply it. Because the plan is
//! recomputed on every run, running again after a partial failure
//! converges instead of repeating work.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::configstore::{self, ConfigStore};
use crate::error::Result;
use crate::planner::{ApplyReport, ChangeType, DiffEngine, DiffPlan, PlanExecutor, PlannedUpdate};

/// Reconciler between a local config directory and a config store.
pub struct ConfigReconciler<'a, S: ConfigStore + ?Sized> {
    /// Target store.
    store: &'a S,
    /// Group for created items.
    group: String,
    /// Diff engine.
    diff_engine: DiffEngine,
}

/// Result of a sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    /// Target namespace.
    pub namespace: String,
    /// Items left untouched because they already matched.
    pub unchanged: usize,
    /// Operations applied.
    #[serde(flatten)]
    pub report: ApplyReport,
}

impl<'a, S: ConfigStore + ?Sized> ConfigReconciler<'a, S> {
    /// Creates a reconciler creating items in `group`.
    #[must_use]
    pub fn new(store: &'a S, group: impl Into<String>) -> Self {
        Self {
            store,
            group: group.into(),
            diff_engine: DiffEngine::new(),
        }
    }

    /// Computes the plan without changing anything.
    ///
    /// Each item present on both sides is fetched with `get` and compared
    /// byte for byte, together with its normalized type.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or a store call
    /// fails.
    pub async fn plan(&self, namespace: &str, local_root: &Path) -> Result<DiffPlan> {
        let local = configstore::snapshot(local_root)?;
        let remote = self.store.list(namespace).await?;
        debug!(
            "{} local files, {} remote items in {namespace}",
            local.len(),
            remote.len()
        );

        let matched = self.diff_engine.match_ids(&local, &remote);

        let mut plan = DiffPlan::new(namespace, self.group.clone());
        plan.adds = matched.adds;
        plan.deletes = matched.deletes;

        for (file, listed) in matched.matched {
            let current = self
                .store
                .get(namespace, &listed.group, &listed.data_id)
                .await?;

            match self.diff_engine.classify(&file, &current) {
                ChangeType::NoChange => plan.unchanged.push(current),
                _ => plan.updates.push(PlannedUpdate {
                    local: file,
                    current,
                }),
            }
        }

        info!("{plan}");
        Ok(plan)
    }

    /// Makes the namespace mirror the local directory.
    ///
    /// # Errors
    ///
    /// Returns an error if planning fails, or `ReconcileError::PhaseFailed`
    /// for the first failing operation of the apply.
    pub async fn sync(&self, namespace: &str, local_root: &Path) -> Result<SyncResult> {
        info!(
            "Syncing {} into {} namespace {namespace}",
            local_root.display(),
            self.store.provider_name()
        );

        let plan = self.plan(namespace, local_root).await?;
        let report = PlanExecutor::new(self.store).apply(&plan).await?;

        Ok(SyncResult {
            namespace: namespace.to_string(),
            unchanged: plan.unchanged.len(),
            report,
        })
    }

    /// Writes every item of the namespace under `local_root` as
    /// `<dataId>[.<type>]`.
    ///
    /// Listings that omit content are completed with `get`.
    ///
    /// # Errors
    ///
    /// Returns an error if a store call fails or a file cannot be written.
    pub async fn pull(&self, namespace: &str, local_root: &Path) -> Result<Vec<PathBuf>> {
        info!(
            "Pulling {} namespace {namespace} into {}",
            self.store.provider_name(),
            local_root.display()
        );

        let mut written = Vec::new();
        for listed in self.store.list(namespace).await? {
            let item = if listed.content.is_some() {
                listed
            } else {
                self.store
                    .get(namespace, &listed.group, &listed.data_id)
                    .await?
            };
            written.push(configstore::write_item(local_root, &item)?);
        }

        info!("Wrote {} config files", written.len());
        Ok(written)
    }
}

impl std::fmt::Display for SyncResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}, {} unchanged", self.namespace, self.report, self.unchanged)
    }
}
