//! Planning module for config sync.
//!
//! This module matches the local config directory against a store
//! namespace and applies the resulting plan.

mod diff;
mod executor;
mod plan;

pub use diff::{ChangeType, DiffEngine, IdMatch};
pub use executor::{ApplyReport, PlanExecutor};
pub use plan::{DiffPlan, PlannedAction, PlannedUpdate};
