//! Shipyard CLI entrypoint.
//!
//! This is the main entrypoint for the shipyard command-line tool.

use std::path::PathBuf;
use std::process::ExitCode;

use shipyard::cli::{Cli, Commands, EnvCommands, OutputFormatter};
use shipyard::cluster::KubeConnector;
use shipyard::config::{ReleaseContext, ReleaseSettings, SyncSettings, VariableSource};
use shipyard::configstore;
use shipyard::error::Result;
use shipyard::notify::{notify_quietly, Notification, Notifier, WebhookNotifier};
use shipyard::reconciler::{ConfigReconciler, SyncResult};
use shipyard::release::{ReleaseDispatcher, ReleaseOutcome};

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(kind = ?e.kind(), "{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` wins over `--verbose` when set.
fn init_logging(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let mut ctx = ReleaseContext::load(&cli.vars, cli.env_dir.as_deref()).await?;

    match cli.command {
        Commands::Release => cmd_release(&ctx, &formatter).await,
        Commands::Sync { directory, namespace } => {
            apply_sync_overrides(&mut ctx, directory, namespace);
            cmd_sync(&ctx, &formatter).await
        }
        Commands::Plan { directory, namespace } => {
            apply_sync_overrides(&mut ctx, directory, namespace);
            cmd_plan(&ctx, &formatter).await
        }
        Commands::Pull { directory, namespace } => {
            apply_sync_overrides(&mut ctx, directory, namespace);
            cmd_pull(&ctx, &formatter).await
        }
        Commands::Env { command } => cmd_env(&ctx, command, &formatter).await,
    }
}

/// Lets `--directory` and `--namespace` stand in for their variables.
fn apply_sync_overrides(ctx: &mut ReleaseContext, directory: Option<PathBuf>, namespace: Option<String>) {
    if let Some(directory) = directory {
        ctx.set("CI_PROJECT_DIR", directory.display().to_string());
        ctx.set("P_CONFIG_DIRECTORY", ".");
    }
    if let Some(namespace) = namespace {
        ctx.set("P_INSTANCE_NAMESPACE", namespace);
    }
}

/// Release the service image to every target.
async fn cmd_release(ctx: &ReleaseContext, formatter: &OutputFormatter) -> Result<()> {
    if ctx.should_skip_stage().await {
        formatter.warning("Stage skipped by commit message");
        return Ok(());
    }

    let notifier = WebhookNotifier::from_context(ctx).await;
    match release(ctx).await {
        Ok((settings, outcomes)) => {
            eprintln!("{}", formatter.format_release(&outcomes));
            let message = format!(
                "{} released {} to {} targets",
                settings.service_name,
                settings.image,
                outcomes.len()
            );
            notify(notifier.as_ref(), &Notification::success(message)).await;
            formatter.success("Release completed");
            Ok(())
        }
        Err(e) => {
            notify(notifier.as_ref(), &Notification::failure(e.to_string())).await;
            Err(e)
        }
    }
}

async fn release(ctx: &ReleaseContext) -> Result<(ReleaseSettings, Vec<ReleaseOutcome>)> {
    let settings = ReleaseSettings::from_context(ctx).await?;
    let outcomes = ReleaseDispatcher::new(&KubeConnector, ctx)
        .dispatch(&settings)
        .await?;
    Ok((settings, outcomes))
}

/// Sync the local config directory into the store.
async fn cmd_sync(ctx: &ReleaseContext, formatter: &OutputFormatter) -> Result<()> {
    if ctx.should_skip_stage().await {
        formatter.warning("Stage skipped by commit message");
        return Ok(());
    }

    let notifier = WebhookNotifier::from_context(ctx).await;
    match sync(ctx).await {
        Ok(sync) => {
            eprintln!("{}", formatter.format_sync(&sync));
            notify(notifier.as_ref(), &Notification::success(sync.to_string())).await;
            Ok(())
        }
        Err(e) => {
            notify(notifier.as_ref(), &Notification::failure(e.to_string())).await;
            Err(e)
        }
    }
}

async fn sync(ctx: &ReleaseContext) -> Result<SyncResult> {
    let settings = SyncSettings::from_context(ctx).await?;
    debug!("Sync settings: {settings:?}");
    let store = configstore::connect(&settings.credentials).await?;
    ConfigReconciler::new(store.as_ref(), settings.group.as_str())
        .sync(&settings.namespace, &settings.directory)
        .await
}

/// Show the sync plan.
async fn cmd_plan(ctx: &ReleaseContext, formatter: &OutputFormatter) -> Result<()> {
    let settings = SyncSettings::from_context(ctx).await?;
    let store = configstore::connect(&settings.credentials).await?;

    let plan = ConfigReconciler::new(store.as_ref(), settings.group.as_str())
        .plan(&settings.namespace, &settings.directory)
        .await?;

    info!("{plan}");
    eprintln!("{}", formatter.format_plan(&plan));
    Ok(())
}

/// Download a namespace into the local directory.
async fn cmd_pull(ctx: &ReleaseContext, formatter: &OutputFormatter) -> Result<()> {
    let settings = SyncSettings::from_context(ctx).await?;
    let store = configstore::connect(&settings.credentials).await?;

    let written = ConfigReconciler::new(store.as_ref(), settings.group.as_str())
        .pull(&settings.namespace, &settings.directory)
        .await?;

    eprintln!("{}", formatter.format_pull(&written));
    Ok(())
}

/// Read and manage variables on the key/value service.
async fn cmd_env(ctx: &ReleaseContext, command: EnvCommands, formatter: &OutputFormatter) -> Result<()> {
    let client = ctx.key_value_client()?;
    match command {
        EnvCommands::Get { key } => {
            let value = client.get(&key).await?;
            eprintln!("{}", formatter.format_variable(&key, value.as_deref()));
        }
        EnvCommands::List { prefix } => {
            let entries = client.entries(prefix.as_deref().unwrap_or_default()).await?;
            eprintln!("{}", formatter.format_variables(&entries));
        }
        EnvCommands::Push { key, value, description } => {
            client.push(&key, &value, &description).await?;
            formatter.success(&format!("Saved {key}"));
        }
        EnvCommands::Remove { key } => {
            client.remove(&key).await?;
            formatter.success(&format!("Removed {key}"));
        }
    }
    Ok(())
}

async fn notify(notifier: Option<&WebhookNotifier>, notification: &Notification) {
    notify_quietly(notifier.map(|n| n as &dyn Notifier), notification).await;
}
