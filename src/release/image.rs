//! Per-cluster image rewrites.
//!
//! Clusters may pull from different registries. The rewrite table maps a
//! cluster name to a `from->to` rule; every occurrence of `from` in the
//! desired image is replaced by `to` before the image is compared with the
//! deployment's.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::IMAGE_REWRITE_KEY;
use crate::error::{ConfigError, Result};

/// Separator between the two halves of a rule.
const RULE_SEPARATOR: &str = "->";

/// Rewrite rules keyed by uppercase cluster name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageRewriteTable {
    rules: HashMap<String, (String, String)>,
}

impl ImageRewriteTable {
    /// Parses a JSON object of `cluster: "from->to"` entries.
    ///
    /// Values without a separator, or with an empty `from`, are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a JSON object.
    pub fn parse(raw: &str) -> Result<Self> {
        let entries: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)
            .map_err(|e| ConfigError::parse(format!("image rewrite table: {e}"), IMAGE_REWRITE_KEY))?;

        let mut rules = HashMap::new();
        for (cluster, value) in entries {
            let rule = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            let mut parts = rule.split(RULE_SEPARATOR);
            match (parts.next(), parts.next()) {
                (Some(from), Some(to)) if !from.is_empty() => {
                    rules.insert(cluster.to_uppercase(), (from.to_string(), to.to_string()));
                }
                _ => warn!("Ignoring image rewrite for {cluster}: {rule}"),
            }
        }

        Ok(Self { rules })
    }

    /// Adds or replaces the rule for a cluster.
    pub fn insert(&mut self, cluster: &str, from: &str, to: &str) {
        self.rules
            .insert(cluster.to_uppercase(), (from.to_string(), to.to_string()));
    }

    /// Returns the image to release on `cluster`.
    #[must_use]
    pub fn rewrite(&self, cluster: &str, image: &str) -> String {
        match self.rules.get(&cluster.to_uppercase()) {
            Some((from, to)) => {
                let rewritten = image.replace(from.as_str(), to);
                debug!("Image for {cluster}: {image} -> {rewritten}");
                rewritten
            }
            None => image.to_string(),
        }
    }

    /// Returns true if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_is_case_insensitive_on_cluster() {
        let table = ImageRewriteTable::parse(
            r#"{"hz": "registry.cn-hangzhou->registry-vpc.cn-hangzhou", "SH": "a->b"}"#,
        )
        .unwrap();

        assert_eq!(
            table.rewrite("HZ", "registry.cn-hangzhou.example.com/app:1"),
            "registry-vpc.cn-hangzhou.example.com/app:1"
        );
        assert_eq!(table.rewrite("sh", "a/a:1"), "b/b:1");
        assert_eq!(table.rewrite("BJ", "a/a:1"), "a/a:1");
    }

    #[test]
    fn test_malformed_rules_are_ignored() {
        let table = ImageRewriteTable::parse(r#"{"hz": "no separator", "sh": "->x", "bj": 12}"#).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_not_an_object() {
        let err = ImageRewriteTable::parse("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("image rewrite table"));
    }
}
