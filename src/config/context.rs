//! Release context: the explicit variable map a run works from.
//!
//! Variables are collected once, in precedence order, from CLI `KEY=VALUE`
//! arguments, the process environment, a `.env` file and the global `GL_*`
//! pairs of the key/value service. Keys missing from all of them are looked
//! up lazily on the key/value service.

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

use super::remote::{
    DEFAULT_SERVER_URL, KeyValueClient, SERVER_TOKEN_KEY, SERVER_URL_KEY, VariableSource,
};

/// Prefix of the global variables prefetched from the key/value service.
pub const GLOBAL_PREFIX: &str = "GL";

/// Current CI job stage.
pub const JOB_STAGE_KEY: &str = "CI_JOB_STAGE";

/// Commit message of the pipeline.
pub const COMMIT_MESSAGE_KEY: &str = "CI_COMMIT_MESSAGE";

/// Commit message prefix that restricts a pipeline to one stage.
const STAGE_MARKER: &str = "C.";

/// Variables available to one release run.
pub struct ReleaseContext {
    /// Resolved variables.
    variables: HashMap<String, String>,
    /// Fallback for keys not present locally.
    remote: Option<Box<dyn VariableSource>>,
}

impl std::fmt::Debug for ReleaseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseContext")
            .field("variables", &self.variables.len())
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

impl ReleaseContext {
    /// Creates a context from a fixed map, without remote lookups.
    #[must_use]
    pub fn from_map(variables: HashMap<String, String>) -> Self {
        Self {
            variables: variables
                .into_iter()
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .collect(),
            remote: None,
        }
    }

    /// Attaches a remote fallback source.
    #[must_use]
    pub fn with_remote(mut self, remote: Box<dyn VariableSource>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Loads the context for a CI run.
    ///
    /// `overrides` are `KEY=VALUE` strings from the command line; `base_dir`
    /// is where a `.env` file is looked for.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is malformed or the `.env` file
    /// exists but cannot be parsed.
    pub async fn load(overrides: &[String], base_dir: Option<&Path>) -> Result<Self> {
        let mut variables = HashMap::new();

        // Lowest precedence first; later inserts win.
        let env_path = base_dir.map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));
        for (key, value) in load_dotenv(&env_path)? {
            variables.insert(key, value);
        }

        for (key, value) in std::env::vars() {
            variables.insert(key, value);
        }

        for (key, value) in parse_overrides(overrides)? {
            debug!("Loaded variable from arguments: {key}");
            variables.insert(key, value);
        }

        let mut context = Self::from_map(variables);
        let remote = context.key_value_client()?;

        match remote.list(GLOBAL_PREFIX).await {
            Ok(entries) => {
                debug!("Prefetched {} global variables", entries.len());
                for (key, value) in entries {
                    if !value.is_empty() {
                        context.variables.entry(key).or_insert(value);
                    }
                }
            }
            Err(e) => warn!("Key/value service unavailable: {e}"),
        }

        Ok(context.with_remote(Box::new(remote)))
    }

    /// Sets a variable, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Looks up a variable. Empty values count as absent.
    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.variables.get(key).filter(|v| !v.is_empty()) {
            return Some(value.clone());
        }

        let remote = self.remote.as_ref()?;
        match remote.get(key).await {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                debug!("Remote lookup of {key} failed: {e}");
                None
            }
        }
    }

    /// Returns the first of `keys` that is set.
    pub async fn get_first(&self, keys: &[&str]) -> Option<String> {
        for key in keys {
            if let Some(value) = self.get(key).await {
                return Some(value);
            }
        }
        None
    }

    /// Looks up a variable that must be present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingVariable` if the variable is absent.
    pub async fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .await
            .ok_or_else(|| ConfigError::missing(key).into())
    }

    /// Builds a client for the key/value service named by `GL_SERVER_URL`
    /// and `GL_SERVER_ACCESS_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn key_value_client(&self) -> Result<KeyValueClient> {
        let server_url = self
            .variables
            .get(SERVER_URL_KEY)
            .map_or(DEFAULT_SERVER_URL, String::as_str);
        let token = self
            .variables
            .get(SERVER_TOKEN_KEY)
            .map_or("", String::as_str);
        KeyValueClient::new(server_url, token)
    }

    /// Returns true if the commit message restricts the pipeline to a
    /// different stage than the current one.
    ///
    /// A message of the form `C.<STAGE> ...` runs only jobs of `<STAGE>`.
    pub async fn should_skip_stage(&self) -> bool {
        let Some(stage) = self.get(JOB_STAGE_KEY).await else {
            return false;
        };
        let Some(message) = self.get(COMMIT_MESSAGE_KEY).await else {
            return false;
        };

        let stage = stage.trim().to_uppercase();
        let message = message.to_uppercase();

        if message.starts_with(STAGE_MARKER) {
            let skip = !message.starts_with(&format!("{STAGE_MARKER}{stage}"));
            if skip {
                info!("Commit message targets another stage, skipping {stage}");
            }
            return skip;
        }
        false
    }
}

/// Parses `KEY=VALUE` arguments; entries with an empty key or value are ignored.
///
/// # Errors
///
/// Returns an error if an argument has no `=`.
pub fn parse_overrides(overrides: &[String]) -> Result<Vec<(String, String)>> {
    let mut parsed = Vec::with_capacity(overrides.len());

    for item in overrides {
        let Some((key, value)) = item.split_once('=') else {
            return Err(ConfigError::parse(
                format!("Expected KEY=VALUE, got '{item}'"),
                "--var",
            )
            .into());
        };
        if key.is_empty() || value.is_empty() {
            continue;
        }
        parsed.push((key.to_string(), value.to_string()));
    }

    Ok(parsed)
}

/// Reads a `.env` file without touching the process environment.
fn load_dotenv(path: &Path) -> Result<Vec<(String, String)>> {
    if !path.exists() {
        debug!(".env file not found at: {}", path.display());
        return Ok(vec![]);
    }

    info!("Loading environment from: {}", path.display());
    let iter = dotenvy::from_path_iter(path)
        .map_err(|e| ConfigError::parse(format!("Failed to load .env file: {e}"), path.display().to_string()))?;

    iter.map(|item| {
        item.map_err(|e| {
            ConfigError::parse(format!("Failed to load .env file: {e}"), path.display().to_string()).into()
        })
    })
    .collect()
}
