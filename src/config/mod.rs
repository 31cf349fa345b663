//! Configuration module for the shipyard release engine.
//!
//! This module handles all configuration-related functionality:
//! - Building the explicit [`ReleaseContext`] variable map for a run
//! - Looking up variables on the remote key/value service
//! - Deriving typed release and sync settings

mod context;
mod remote;
mod settings;

pub use context::{parse_overrides, ReleaseContext};
pub use remote::{KeyValueClient, VariableEntry, VariableSource, FILE_VALUE_PREFIX};
pub use settings::{
    ProviderKind, ReleaseSettings, StoreCredentials, SyncSettings, DEFAULT_GROUP,
    IMAGE_REWRITE_KEY, STORE_CREDENTIALS_PREFIX,
};
