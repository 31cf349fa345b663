//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying plans, sync
//! and release results in text or JSON.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use std::path::PathBuf;
use tabled::{Table, Tabled};

use crate::config::VariableEntry;
use crate::planner::{ChangeType, DiffPlan, PlannedAction};
use crate::reconciler::SyncResult;
use crate::release::{ReleaseAction, ReleaseOutcome};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Data ID")]
    data_id: String,
    #[tabled(rename = "Type")]
    config_type: String,
}

/// Release target row for table display.
#[derive(Tabled)]
struct ReleaseRow {
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Variable row for table display.
#[derive(Tabled)]
struct VariableRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a sync plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &DiffPlan) -> String {
        match self.format {
            OutputFormat::Json => to_json(&PlanJson::from(plan)),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &DiffPlan) -> String {
        if plan.is_empty() {
            return format!(
                "{} No changes required, namespace {} matches the local directory ({} unchanged).\n",
                "✓".green(),
                plan.namespace,
                plan.unchanged.len()
            );
        }

        let mut output = String::new();
        let _ = write!(output, "\nSync plan for namespace {}\n\n", plan.namespace);

        let rows: Vec<PlanActionRow> = plan
            .actions()
            .into_iter()
            .filter(|a| a.change != ChangeType::NoChange)
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_change(a.change),
                group: a.group,
                data_id: a.data_id,
                config_type: a.config_type,
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = writeln!(
            output,
            "\nPlan: {} to create, {} to update, {} to delete, {} unchanged",
            plan.adds.len().to_string().green(),
            plan.updates.len().to_string().yellow(),
            plan.deletes.len().to_string().red(),
            plan.unchanged.len()
        );

        output
    }

    /// Formats the result of a sync run.
    #[must_use]
    pub fn format_sync(&self, result: &SyncResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(result),
            OutputFormat::Text => {
                let mut output = format!(
                    "{} Namespace {} synchronized\n\n",
                    "✓".green(),
                    result.namespace
                );
                let _ = writeln!(output, "   Created: {}", result.report.created.len());
                let _ = writeln!(output, "   Updated: {}", result.report.updated.len());
                let _ = writeln!(output, "   Deleted: {}", result.report.deleted.len());
                let _ = writeln!(output, "   Unchanged: {}", result.unchanged);
                output
            }
        }
    }

    /// Formats release outcomes, one row per target.
    #[must_use]
    pub fn format_release(&self, outcomes: &[ReleaseOutcome]) -> String {
        match self.format {
            OutputFormat::Json => to_json(&outcomes),
            OutputFormat::Text => {
                if outcomes.is_empty() {
                    return String::from("No release targets.\n");
                }

                let rows: Vec<ReleaseRow> = outcomes
                    .iter()
                    .map(|o| {
                        let (action, detail) = Self::format_release_action(&o.action);
                        ReleaseRow {
                            cluster: o.cluster.clone(),
                            namespace: o
                                .namespace
                                .clone()
                                .unwrap_or_else(|| o.requested_namespace.clone()),
                            action,
                            detail,
                        }
                    })
                    .collect();

                let mut output = Table::new(rows).to_string();
                output.push('\n');

                let skipped = outcomes
                    .iter()
                    .filter(|o| o.action == ReleaseAction::Skipped)
                    .count();
                let _ = writeln!(
                    output,
                    "\nReleased to {} of {} targets",
                    outcomes.len() - skipped,
                    outcomes.len()
                );
                output
            }
        }
    }

    /// Formats the files written by a pull.
    #[must_use]
    pub fn format_pull(&self, written: &[PathBuf]) -> String {
        match self.format {
            OutputFormat::Json => to_json(&written),
            OutputFormat::Text => {
                let mut output = String::new();
                for path in written {
                    let _ = writeln!(output, "   {}", path.display());
                }
                let _ = writeln!(output, "\n{} {} files written", "✓".green(), written.len());
                output
            }
        }
    }

    /// Formats stored variables.
    ///
    /// Text output shows the first line of each value only.
    #[must_use]
    pub fn format_variables(&self, variables: &[VariableEntry]) -> String {
        match self.format {
            OutputFormat::Json => to_json(variables),
            OutputFormat::Text => {
                if variables.is_empty() {
                    return String::from("No variables.\n");
                }
                let rows: Vec<VariableRow> = variables
                    .iter()
                    .map(|v| VariableRow {
                        key: v.key.clone(),
                        value: Self::preview(&v.value, 60),
                        description: v.description.clone(),
                    })
                    .collect();
                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats a single variable lookup.
    #[must_use]
    pub fn format_variable(&self, key: &str, value: Option<&str>) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({ "key": key, "value": value })),
            OutputFormat::Text => value.map_or_else(
                || format!("{} {key} is not set\n", "⚠".yellow()),
                |v| format!("{v}\n"),
            ),
        }
    }

    fn format_change(change: ChangeType) -> String {
        match change {
            ChangeType::Create => "+create".green().to_string(),
            ChangeType::Update => "~update".yellow().to_string(),
            ChangeType::Delete => "-delete".red().to_string(),
            ChangeType::NoChange => "no change".dimmed().to_string(),
        }
    }

    fn format_release_action(action: &ReleaseAction) -> (String, String) {
        match action {
            ReleaseAction::Skipped => (
                "skipped".dimmed().to_string(),
                String::from("namespace not found"),
            ),
            ReleaseAction::ImagePatched { image } => {
                ("~image".yellow().to_string(), Self::truncate(image, 50))
            }
            ReleaseAction::PodsRecycled { selector, pods } => (
                "recycle".green().to_string(),
                format!("{} pods ({selector})", pods.len()),
            ),
        }
    }

    /// First line of a multi-line value, truncated.
    fn preview(value: &str, max_len: usize) -> String {
        let mut lines = value.lines();
        let first = Self::truncate(lines.next().unwrap_or_default(), max_len);
        if lines.next().is_some() && !first.ends_with("...") {
            format!("{first} ...")
        } else {
            first
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }

    /// Prints a success message.
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Json => {
                eprintln!("{}", to_json(&serde_json::json!({ "status": "success", "message": message })));
            }
            OutputFormat::Text => eprintln!("{} {message}", "✓".green()),
        }
    }

    /// Prints a warning message.
    pub fn warning(&self, message: &str) {
        match self.format {
            OutputFormat::Json => {
                eprintln!("{}", to_json(&serde_json::json!({ "status": "warning", "message": message })));
            }
            OutputFormat::Text => eprintln!("{} {message}", "⚠".yellow()),
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

// JSON serialization helpers

#[derive(Serialize)]
struct PlanJson {
    namespace: String,
    group: String,
    created_at: String,
    total_changes: usize,
    creates: usize,
    updates: usize,
    deletes: usize,
    unchanged: usize,
    actions: Vec<PlannedAction>,
}

impl From<&DiffPlan> for PlanJson {
    fn from(plan: &DiffPlan) -> Self {
        Self {
            namespace: plan.namespace.clone(),
            group: plan.group.clone(),
            created_at: plan.created_at.to_rfc3339(),
            total_changes: plan.total_changes(),
            creates: plan.adds.len(),
            updates: plan.updates.len(),
            deletes: plan.deletes.len(),
            unchanged: plan.unchanged.len(),
            actions: plan.actions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configstore::{LocalConfigFile, RemoteConfigItem};

    fn plan() -> DiffPlan {
        let mut plan = DiffPlan::new("dev", "DEFAULT_GROUP");
        plan.adds.push(LocalConfigFile::new("app.yaml", b"a: 1".to_vec()));
        plan.deletes.push(RemoteConfigItem {
            namespace: String::from("dev"),
            group: String::from("DEFAULT_GROUP"),
            data_id: String::from("old"),
            content: None,
            config_type: String::from("text"),
            id: String::from("42"),
        });
        plan
    }

    #[test]
    fn test_plan_json_lists_actions() {
        let output = OutputFormatter::new(OutputFormat::Json).format_plan(&plan());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["creates"], 1);
        assert_eq!(value["deletes"], 1);
        assert_eq!(value["actions"][0]["change"], "create");
        assert_eq!(value["actions"][0]["data_id"], "app");
        assert_eq!(value["actions"][1]["change"], "delete");
    }

    #[test]
    fn test_empty_plan_text() {
        let output = OutputFormatter::new(OutputFormat::Text).format_plan(&DiffPlan::new("dev", "G"));
        assert!(output.contains("No changes required"));
    }

    #[test]
    fn test_release_json_flattens_action() {
        let outcomes = vec![ReleaseOutcome {
            cluster: String::from("HZ"),
            requested_namespace: String::from("svc"),
            namespace: Some(String::from("svc")),
            pull_policy_updated: false,
            action: ReleaseAction::ImagePatched {
                image: String::from("img:2"),
            },
        }];

        let output = OutputFormatter::new(OutputFormat::Json).format_release(&outcomes);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value[0]["action"], "image_patched");
        assert_eq!(value[0]["image"], "img:2");
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(OutputFormatter::truncate("abcdef", 10), "abcdef");
        assert_eq!(OutputFormatter::truncate("abcdefghij", 6), "abc...");
    }

    #[test]
    fn test_variables_preview_first_line() {
        let entries = vec![VariableEntry {
            key: String::from("GS_RELEASE_KUBERNETES_HZ"),
            value: String::from("apiVersion: v1\nkind: Config\n"),
            description: String::from("HZ cluster"),
        }];

        let output = OutputFormatter::new(OutputFormat::Text).format_variables(&entries);
        assert!(output.contains("apiVersion: v1 ..."));
        assert!(!output.contains("kind: Config"));
        assert!(output.contains("HZ cluster"));
    }
}
