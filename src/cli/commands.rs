//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Shipyard - release services to Kubernetes and sync Nacos configs.
#[derive(Parser, Debug)]
#[command(name = "shipyard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Set a variable, overriding the environment (repeatable).
    #[arg(long = "var", value_name = "KEY=VALUE", global = true)]
    pub vars: Vec<String>,

    /// Directory holding the `.env` file.
    #[arg(long, global = true, env = "SHIPYARD_ENV_DIR")]
    pub env_dir: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Release the service image to every configured cluster and namespace.
    Release,

    /// Make a config store namespace mirror the local config directory.
    Sync {
        /// Local directory (defaults to `$CI_PROJECT_DIR/$P_CONFIG_DIRECTORY`).
        #[arg(short, long)]
        directory: Option<PathBuf>,

        /// Store namespace (defaults to `$P_INSTANCE_NAMESPACE`).
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Show what `sync` would change, without changing anything.
    Plan {
        /// Local directory (defaults to `$CI_PROJECT_DIR/$P_CONFIG_DIRECTORY`).
        #[arg(short, long)]
        directory: Option<PathBuf>,

        /// Store namespace (defaults to `$P_INSTANCE_NAMESPACE`).
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Download every config of a namespace into a local directory.
    Pull {
        /// Target directory (defaults to `$CI_PROJECT_DIR/$P_CONFIG_DIRECTORY`).
        #[arg(short, long)]
        directory: Option<PathBuf>,

        /// Store namespace (defaults to `$P_INSTANCE_NAMESPACE`).
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Manage variables on the key/value service.
    Env {
        /// Env subcommand.
        #[command(subcommand)]
        command: EnvCommands,
    },
}

/// Key/value variable subcommands.
#[derive(Subcommand, Debug)]
pub enum EnvCommands {
    /// Print one variable.
    Get {
        /// Variable name.
        key: String,
    },

    /// List stored variables, optionally filtered by prefix.
    List {
        /// Name prefix.
        prefix: Option<String>,
    },

    /// Store a variable; `#file://<path>` uploads the file's content.
    Push {
        /// Variable name.
        key: String,

        /// Value, or `#file://<path>`.
        value: String,

        /// Description shown by `env list`.
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Remove a variable.
    Remove {
        /// Variable name.
        key: String,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}
