//! Local config directory snapshot and pull writer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{ConfigError, Result};

use super::types::{normalize_path, normalize_type, LocalConfigFile, RemoteConfigItem};

/// Reads every regular file under `root`, recursively.
///
/// Entries are sorted by relative path. Hidden files are included; a file
/// named `.env` keeps its full name as config id.
///
/// # Errors
///
/// Returns an error if `root` is not a directory, a file cannot be read or
/// is not valid UTF-8, or two files resolve to the same config id (for
/// example `app.yaml` and `app.json`).
pub fn snapshot(root: &Path) -> Result<Vec<LocalConfigFile>> {
    if !root.is_dir() {
        return Err(ConfigError::DirectoryNotFound {
            path: root.to_path_buf(),
        }
        .into());
    }

    let mut files = Vec::new();
    let mut seen: HashMap<String, String> = HashMap::new();

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            ConfigError::parse(format!("Cannot walk config directory: {e}"), root.display().to_string())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).map_err(|e| {
            ConfigError::parse(e.to_string(), entry.path().display().to_string())
        })?;
        let content = std::fs::read(entry.path())?;
        if let Err(e) = std::str::from_utf8(&content) {
            return Err(ConfigError::parse(
                format!("{} is not valid UTF-8: {e}", entry.path().display()),
                entry.path().display().to_string(),
            )
            .into());
        }
        let file = LocalConfigFile::new(&relative.to_string_lossy(), content);

        if let Some(previous) = seen.insert(file.data_id.clone(), file.relative_path.clone()) {
            warn!(
                "{} and {} both map to config id {}",
                previous, file.relative_path, file.data_id
            );
            return Err(ConfigError::DuplicateName {
                resource_type: String::from("config"),
                name: file.data_id,
            }
            .into());
        }

        files.push(file);
    }

    debug!("Found {} local config files under {}", files.len(), root.display());
    Ok(files)
}

/// Path a remote item is written to by a pull: `<root>/<dataId>[.<type>]`.
#[must_use]
pub fn pull_path(root: &Path, item: &RemoteConfigItem) -> PathBuf {
    let config_type = normalize_type(&item.config_type);
    let name = if config_type.is_empty() {
        normalize_path(&item.data_id)
    } else {
        format!("{}.{config_type}", normalize_path(&item.data_id))
    };
    root.join(name)
}

/// Writes a remote item under `root`, creating parent directories.
///
/// Items without content are written as empty files.
///
/// # Errors
///
/// Returns an error if the id escapes `root` or the file cannot be written.
pub fn write_item(root: &Path, item: &RemoteConfigItem) -> Result<PathBuf> {
    if item.data_id.split(['/', '\\']).any(|part| part == "..") {
        return Err(ConfigError::validation(
            format!("config id {} escapes the config directory", item.data_id),
            "dataId",
        )
        .into());
    }

    let path = pull_path(root, item);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, item.content.as_deref().unwrap_or_default())?;
    debug!("Wrote {}", path.display());
    Ok(path)
}
