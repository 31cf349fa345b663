//! CLI module for the shipyard release engine.
//!
//! This module provides the command-line interface for releasing services
//! and syncing config stores from CI jobs.

mod commands;
mod output;

pub use commands::{Cli, Commands, EnvCommands, OutputFormat};
pub use output::OutputFormatter;
