//! Config item types shared by the local snapshot and both store providers.

use serde::Serialize;

/// A config file found under the local config root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfigFile {
    /// Root-relative path with `/` separators.
    pub relative_path: String,
    /// Raw file content.
    pub content: Vec<u8>,
    /// Config id: the relative path without its extension.
    pub data_id: String,
    /// Extension without the leading dot; empty when the file has none.
    pub config_type: String,
}

impl LocalConfigFile {
    /// Builds an entry from a relative path, normalizing separators and
    /// splitting off the extension.
    #[must_use]
    pub fn new(relative_path: &str, content: Vec<u8>) -> Self {
        let relative_path = normalize_path(relative_path);
        let (data_id, config_type) = split_extension(&relative_path);

        Self {
            data_id: data_id.to_string(),
            config_type: config_type.to_string(),
            relative_path,
            content,
        }
    }

    /// Content as text.
    ///
    /// Snapshots only hold valid UTF-8, so nothing is replaced for them.
    #[must_use]
    pub fn content_text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    /// Returns true if `item` already holds exactly this file.
    ///
    /// Content must match byte for byte and types must match after
    /// normalization. Items listed without content never match.
    #[must_use]
    pub fn matches(&self, item: &RemoteConfigItem) -> bool {
        item.content
            .as_deref()
            .is_some_and(|content| content.as_bytes() == self.content.as_slice())
            && normalize_type(&item.config_type) == self.config_type
    }
}

/// A config item as held by a remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteConfigItem {
    /// Namespace (tenant) id.
    pub namespace: String,
    /// Group; `DEFAULT_GROUP` when none was given.
    pub group: String,
    /// Config id, unique within `(namespace, group)`.
    pub data_id: String,
    /// Content; `None` when the listing call does not return bodies.
    pub content: Option<String>,
    /// Declared content type.
    pub config_type: String,
    /// Provider-assigned id.
    pub id: String,
}

/// Strips whitespace and a leading dot, so `.yaml` and `yaml` compare equal.
#[must_use]
pub fn normalize_type(config_type: &str) -> &str {
    config_type.trim().trim_start_matches('.')
}

/// Converts `\` separators to `/` and strips leading separators.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

/// Splits `dir/name.ext` into (`dir/name`, `ext`).
///
/// Only the last path segment is considered; a leading dot in that segment
/// does not start an extension, so `.env` has none.
fn split_extension(path: &str) -> (&str, &str) {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    let name = &path[name_start..];

    match name.rfind('.') {
        Some(dot) if dot > 0 => {
            let split = name_start + dot;
            (&path[..split], &path[split + 1..])
        }
        _ => (path, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_file_identity() {
        let file = LocalConfigFile::new("app.yaml", b"a: 1".to_vec());
        assert_eq!(file.data_id, "app");
        assert_eq!(file.config_type, "yaml");

        let file = LocalConfigFile::new("\\gateway\\routes.json", vec![]);
        assert_eq!(file.relative_path, "gateway/routes.json");
        assert_eq!(file.data_id, "gateway/routes");
        assert_eq!(file.config_type, "json");

        let file = LocalConfigFile::new("conf.d/.env", vec![]);
        assert_eq!(file.data_id, "conf.d/.env");
        assert_eq!(file.config_type, "");

        let file = LocalConfigFile::new("archive.tar.gz", vec![]);
        assert_eq!(file.data_id, "archive.tar");
        assert_eq!(file.config_type, "gz");
    }

    #[test]
    fn test_matches_requires_content_and_type() {
        let file = LocalConfigFile::new("app.yaml", b"a: 1".to_vec());
        let mut item = RemoteConfigItem {
            namespace: String::from("dev"),
            group: String::from("DEFAULT_GROUP"),
            data_id: String::from("app"),
            content: Some(String::from("a: 1")),
            config_type: String::from(".yaml"),
            id: String::from("1"),
        };
        assert!(file.matches(&item));

        item.config_type = String::from("properties");
        assert!(!file.matches(&item));

        item.config_type = String::from("yaml");
        item.content = None;
        assert!(!file.matches(&item));

        item.content = Some(String::from("a: 2"));
        assert!(!file.matches(&item));
    }
}
