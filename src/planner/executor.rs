//! Plan executor for applying sync plans.
//!
//! Phases run in a fixed order: creates, then updates, then deletes. The
//! first failing operation stops the whole apply. Nothing is rolled back;
//! the error lists what had already been applied.

use serde::Serialize;
use tracing::{debug, error, info};

use crate::configstore::ConfigStore;
use crate::error::{ReconcileError, Result, ShipyardError};

use super::plan::DiffPlan;

/// Executor for sync plans.
#[derive(Debug)]
pub struct PlanExecutor<'a, S: ConfigStore + ?Sized> {
    /// Target store.
    store: &'a S,
}

/// Operations applied by a successful run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ApplyReport {
    /// Created config ids.
    pub created: Vec<String>,
    /// Updated config ids.
    pub updated: Vec<String>,
    /// Deleted config ids.
    pub deleted: Vec<String>,
}

impl<'a, S: ConfigStore + ?Sized> PlanExecutor<'a, S> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Applies a plan.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::PhaseFailed` naming the phase and config id
    /// of the first failing operation.
    pub async fn apply(&self, plan: &DiffPlan) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();

        if plan.is_empty() {
            info!("Namespace {} is up to date", plan.namespace);
            return Ok(report);
        }

        info!("Create: {}", plan.adds.len());
        for file in &plan.adds {
            self.store
                .create(
                    &plan.namespace,
                    &plan.group,
                    &file.data_id,
                    &file.content_text(),
                    &file.config_type,
                )
                .await
                .map_err(|e| Self::phase_failed("create", &file.data_id, &report, e))?;
            debug!("Created {}", file.data_id);
            report.created.push(file.data_id.clone());
        }

        info!("Update: {}", plan.updates.len());
        for update in &plan.updates {
            self.store
                .update(&update.current, &update.local.content_text(), &update.local.config_type)
                .await
                .map_err(|e| Self::phase_failed("update", &update.local.data_id, &report, e))?;
            debug!("Updated {}/{}", update.current.group, update.local.data_id);
            report.updated.push(update.local.data_id.clone());
        }

        info!("Delete: {}", plan.deletes.len());
        for item in &plan.deletes {
            self.store
                .delete(&item.namespace, &item.group, &item.data_id)
                .await
                .map_err(|e| Self::phase_failed("delete", &item.data_id, &report, e))?;
            debug!("Deleted {}/{}", item.group, item.data_id);
            report.deleted.push(item.data_id.clone());
        }

        info!("{report}");
        Ok(report)
    }

    fn phase_failed(phase: &str, data_id: &str, report: &ApplyReport, cause: ShipyardError) -> ShipyardError {
        error!("Failed to {phase} {data_id}: {cause}");
        ReconcileError::PhaseFailed {
            phase: phase.to_string(),
            data_id: data_id.to_string(),
            applied: report.operations(),
            source: Box::new(cause),
        }
        .into()
    }
}

impl ApplyReport {
    /// Number of applied operations.
    #[must_use]
    pub fn total(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Applied operations as `phase data_id`, in apply order.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        [
            ("create", &self.created),
            ("update", &self.updated),
            ("delete", &self.deleted),
        ]
        .into_iter()
        .flat_map(|(phase, ids)| ids.iter().map(move |id| format!("{phase} {id}")))
        .collect()
    }
}

impl std::fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Applied {} operations: {} created, {} updated, {} deleted",
            self.total(),
            self.created.len(),
            self.updated.len(),
            self.deleted.len()
        )
    }
}
