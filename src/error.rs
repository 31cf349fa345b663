//! Error types for the shipyard release engine.
//!
//! This module provides the error hierarchy for every stage of a release:
//! configuration lookup, config store calls, cluster API calls, and
//! reconciliation. Every error maps onto one of the [`ErrorKind`] classes
//! the dispatcher and CLI reason about.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the shipyard release engine.
#[derive(Debug, Error)]
pub enum ShipyardError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Config store (Nacos / MSE) errors.
    #[error("Config store error: {0}")]
    Store(#[from] StoreError),

    /// Kubernetes API errors.
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Key/value variable service errors.
    #[error("Key/value service error: {0}")]
    KeyValue(#[from] KeyValueError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classes shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required declared value is absent; raised before any remote call.
    ConfigurationMissing,
    /// Network or authentication failure against a remote system.
    RemoteUnavailable,
    /// A namespace, deployment, pod match or config item does not exist.
    NotFound,
    /// Anything else.
    Internal,
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is missing from every source.
    #[error("Environment variable ${{{name}}} not exist")]
    MissingVariable {
        /// Name of the missing variable.
        name: String,
    },

    /// A variable or file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location (variable name or path).
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Two local files resolve to the same config id.
    #[error("Duplicate {resource_type} name: {name}")]
    DuplicateName {
        /// Type of resource.
        resource_type: String,
        /// The duplicated name.
        name: String,
    },

    /// The config store provider kind is not supported.
    #[error("Unknown config store provider: {provider}")]
    UnknownProvider {
        /// The unsupported provider string.
        provider: String,
    },

    /// The local config directory does not exist.
    #[error("Config directory not found: {path}")]
    DirectoryNotFound {
        /// The missing directory.
        path: PathBuf,
    },
}

/// Config store errors, shared by both providers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Login or signature rejected.
    #[error("Config store authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// Non-success HTTP status.
    #[error("Config store request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the store.
        message: String,
    },

    /// Transport failure.
    #[error("Network error communicating with config store: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Invalid response from config store: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// The item does not exist.
    #[error("Config not found: {namespace}/{group}/{data_id}")]
    NotFound {
        /// Namespace searched.
        namespace: String,
        /// Group searched.
        group: String,
        /// Config id searched.
        data_id: String,
    },

    /// The store answered but refused the mutation.
    #[error("Config store rejected {operation} of {data_id}: {message}")]
    Rejected {
        /// Operation name.
        operation: String,
        /// Config id.
        data_id: String,
        /// Message returned by the store.
        message: String,
    },
}

/// Kubernetes API errors.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Credentials rejected by the API server.
    #[error("Cluster {cluster} authentication failed: {message}")]
    AuthenticationFailed {
        /// Cluster name.
        cluster: String,
        /// Description of the auth failure.
        message: String,
    },

    /// Non-success HTTP status.
    #[error("Cluster {cluster} request failed: {status} - {message}")]
    ApiRequestFailed {
        /// Cluster name.
        cluster: String,
        /// HTTP status code.
        status: u16,
        /// Error message from the API server.
        message: String,
    },

    /// Transport failure.
    #[error("Network error communicating with cluster {cluster}: {message}")]
    NetworkError {
        /// Cluster name.
        cluster: String,
        /// Description of the network error.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Invalid response from cluster {cluster}: {message}")]
    InvalidResponse {
        /// Cluster name.
        cluster: String,
        /// Description of the response issue.
        message: String,
    },

    /// The kubeconfig document is unusable.
    #[error("Invalid kubeconfig for cluster {cluster}: {message}")]
    InvalidKubeconfig {
        /// Cluster name.
        cluster: String,
        /// Description of the problem.
        message: String,
    },

    /// A resource does not exist.
    #[error("{kind} not found: {namespace}/{name}")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Namespace searched.
        namespace: String,
        /// Resource name.
        name: String,
    },
}

/// Key/value variable service errors.
#[derive(Debug, Error)]
pub enum KeyValueError {
    /// The service could not be reached.
    #[error("Request to {path} failed: {message}")]
    RequestFailed {
        /// Request path.
        path: String,
        /// Transport error.
        message: String,
    },

    /// The answer was not the expected JSON envelope.
    #[error("Invalid response from {path}: {message}")]
    InvalidResponse {
        /// Request path.
        path: String,
        /// Decode error.
        message: String,
    },

    /// The service refused a write.
    #[error("{operation} of {key} rejected: {message}")]
    Rejected {
        /// Operation (save, remove).
        operation: String,
        /// Variable key.
        key: String,
        /// Message returned by the service.
        message: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A config sync phase stopped on its first failing operation.
    #[error(
        "Config sync {phase} of '{data_id}' failed after {} applied operations: {source}",
        .applied.len()
    )]
    PhaseFailed {
        /// Phase that failed (create, update, delete).
        phase: String,
        /// Config id whose operation failed.
        data_id: String,
        /// Operations applied before the failure, as `phase data_id`.
        applied: Vec<String>,
        /// Underlying failure.
        #[source]
        source: Box<ShipyardError>,
    },

    /// The deployment or its pods could not be found.
    #[error("{cluster} -> {namespace}/{service}: {what} not found")]
    TargetNotFound {
        /// Cluster name.
        cluster: String,
        /// Resolved namespace.
        namespace: String,
        /// Service (deployment) name.
        service: String,
        /// What was missing (deployment, pods).
        what: String,
    },

    /// A dispatch target failed; remaining targets were not attempted.
    #[error("Release to cluster {cluster} namespace {namespace} failed: {source}")]
    TargetFailed {
        /// Cluster name.
        cluster: String,
        /// Requested namespace.
        namespace: String,
        /// Underlying failure.
        #[source]
        source: Box<ShipyardError>,
    },
}

/// Result type alias for shipyard operations.
pub type Result<T> = std::result::Result<T, ShipyardError>;

impl ShipyardError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classifies this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::ConfigurationMissing,
            Self::Store(StoreError::NotFound { .. })
            | Self::Cluster(ClusterError::NotFound { .. })
            | Self::Reconcile(ReconcileError::TargetNotFound { .. }) => ErrorKind::NotFound,
            Self::Store(_) | Self::Cluster(_) | Self::KeyValue(_) => ErrorKind::RemoteUnavailable,
            Self::Reconcile(
                ReconcileError::PhaseFailed { source, .. } | ReconcileError::TargetFailed { source, .. },
            ) => source.kind(),
            Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if this error reports a missing remote resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl ConfigError {
    /// Creates a missing-variable error.
    #[must_use]
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingVariable { name: name.into() }
    }

    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a parse error attributed to a variable or path.
    #[must_use]
    pub fn parse(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location: Some(location.into()),
        }
    }
}

impl StoreError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl ClusterError {
    /// Creates a network error.
    #[must_use]
    pub fn network(cluster: &str, message: impl Into<String>) -> Self {
        Self::NetworkError {
            cluster: cluster.to_string(),
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid(cluster: &str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            cluster: cluster.to_string(),
            message: message.into(),
        }
    }

    /// Creates a kubeconfig error.
    #[must_use]
    pub fn kubeconfig(cluster: &str, message: impl Into<String>) -> Self {
        Self::InvalidKubeconfig {
            cluster: cluster.to_string(),
            message: message.into(),
        }
    }
}
