//! Kubernetes release flow.
//!
//! A release rolls one service image out to a set of clusters and
//! namespaces. [`ReleaseDispatcher`] walks the targets; for each one,
//! [`DeploymentReconciler`] either patches the image or, when the image is
//! unchanged, deletes the pods so they pull it again.

mod deployment;
mod dispatcher;
mod image;

pub use deployment::{DeploymentReconciler, ReleaseAction, ReleaseOutcome, SELECTOR_PRIORITY};
pub use dispatcher::{ReleaseDispatcher, CLUSTER_CREDENTIALS_PREFIX};
pub use image::ImageRewriteTable;
