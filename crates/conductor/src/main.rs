//! Conductor - workflow job orchestration
//!
//! Main entry point for the Conductor CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{autopilot, daemon, health, run, workflows};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Conductor - run, schedule and supervise automation workflows
#[derive(Parser)]
#[command(name = "conductor")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// User config directory (default: platform config dir)
    #[arg(long, global = true, env = "CONDUCTOR_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Project directory containing conductor.toml (default: current dir)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a workflow and wait for it to finish
    Run(run::RunArgs),

    /// Run compliance-check rounds until they pass
    Autopilot(autopilot::AutopilotArgs),

    /// List registered workflows
    Workflows(workflows::WorkflowsArgs),

    /// Show engine health and metrics
    Health(health::HealthArgs),

    /// Run configured schedules until interrupted
    Daemon(daemon::DaemonArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = conductor_config::load_config_with_options(
        cli.project_dir.as_deref(),
        cli.config_dir.as_deref(),
    )?;
    let logging = loaded.config.logging.clone().unwrap_or_default();

    // Initialize tracing — console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "conductor=debug,conductor_engine=debug,conductor_config=debug,info"
    } else {
        "conductor=info,conductor_engine=info,warn"
    };

    let log_dir = logging
        .directory
        .clone()
        .or_else(|| {
            cli.config_dir
                .clone()
                .or_else(conductor_config::user_config_dir)
                .map(|d| d.join("logs"))
        })
        .unwrap_or_else(|| PathBuf::from("logs"));

    let (file_layer, _guard) = if logging.file {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "conductor.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(tracing_subscriber::EnvFilter::new(
                "conductor=trace,conductor_engine=trace,conductor_config=trace,info",
            ));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(file_layer)
        .init();

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }
    for path in loaded.loaded_from() {
        tracing::debug!(path = %path.display(), "Loaded config layer");
    }

    // Create context for commands
    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        project_dir: cli.project_dir,
        config: loaded.config,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Run(args) => run::run(args, &ctx).await,
        Commands::Autopilot(args) => autopilot::run(args, &ctx).await,
        Commands::Workflows(args) => workflows::run(args, &ctx).await,
        Commands::Health(args) => health::run(args, &ctx).await,
        Commands::Daemon(args) => daemon::run(args, &ctx).await,
    }
}
