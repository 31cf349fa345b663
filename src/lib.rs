// ============================================================================
// Linting
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // Public items should be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(clippy::todo)]
#![warn(clippy::unimplemented)]
#![warn(clippy::unwrap_in_result)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::cognitive_complexity)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Shipyard
//!
//! A release engine for CI jobs: it rolls service images out to Kubernetes
//! clusters and keeps Nacos-compatible config stores in step with a
//! directory of config files.
//!
//! ## Overview
//!
//! Every run starts from an explicit [`ReleaseContext`], a variable map
//! assembled from command-line `KEY=VALUE` pairs, the process environment,
//! a `.env` file and a remote key/value service. Commands then derive typed
//! settings from it before touching anything remote.
//!
//! - **release**: for each configured cluster and namespace, patch the
//!   deployment image, or recycle its pods when the image is unchanged
//! - **sync**: make a config store namespace mirror the local directory
//!   (create, update, delete) and converge when run again
//! - **plan** / **pull**: preview a sync, or download a namespace
//!
//! ## Modules
//!
//! - [`config`]: Release context, remote variables and typed settings
//! - [`cluster`]: Kubernetes API client and kubeconfig handling
//! - [`release`]: Per-target deployment reconciliation and dispatch
//! - [`configstore`]: MSE and Nacos config store providers, local snapshots
//! - [`planner`]: Diff computation and plan execution
//! - [`reconciler`]: Config store reconciliation
//! - [`notify`]: Chat robot notifications
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```text
//! shipyard --var P_SERVICE_TYPE=ALIYUN --var P_INSTANCE_ID=main sync
//! shipyard release
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod cluster;
pub mod config;
pub mod configstore;
pub mod error;
pub mod notify;
pub mod planner;
pub mod reconciler;
pub mod release;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use cluster::{ClusterClient, ClusterConnector, KubeApiClient, KubeConnector};
pub use config::{ReleaseContext, ReleaseSettings, SyncSettings};
pub use configstore::{ConfigStore, MseConfigStore, NacosConfigStore};
pub use error::{ErrorKind, Result, ShipyardError};
pub use notify::{Notifier, WebhookNotifier};
pub use planner::{DiffEngine, DiffPlan, PlanExecutor};
pub use reconciler::{ConfigReconciler, SyncResult};
pub use release::{DeploymentReconciler, ReleaseDispatcher, ReleaseOutcome};
