//! Autopilot command - runs compliance rounds until they pass.

use anyhow::Result;
use clap::Args;
use conductor_engine::{AutopilotConfig, JobStatus};
use console::Style;
use serde::Serialize;

use super::{Context, print_job, wait_for_job};

/// Arguments for the autopilot command.
#[derive(Args, Debug)]
pub struct AutopilotArgs {
    /// Maximum number of rounds (default from config, else 3)
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Skip the compliance-check workflow in each round
    #[arg(long)]
    pub no_compliance_check: bool,

    /// Workflow to run after a failing round
    #[arg(long)]
    pub remediation: Option<String>,
}

/// Autopilot result for JSON output.
#[derive(Debug, Serialize)]
struct AutopilotOutput<'a> {
    job: &'a conductor_engine::Job,
    passed: bool,
    rounds: u64,
}

/// Run the autopilot command.
pub async fn run(args: AutopilotArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.build_engine()?;

    let mut config = AutopilotConfig::from(&ctx.config.autopilot_or_default());
    if let Some(rounds) = args.max_rounds {
        config.max_rounds = rounds;
    }
    if args.no_compliance_check {
        config.compliance_check = false;
    }
    if let Some(remediation) = args.remediation {
        config.remediation_workflow = Some(remediation);
    }

    let job_id = engine.start_autopilot(config)?;
    tracing::info!(job_id = %job_id, "Started autopilot");

    let job = wait_for_job(&engine, &job_id).await?;
    let passed = job
        .metadata
        .get("passed")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let rounds = job
        .metadata
        .get("round")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    if ctx.json_output {
        let output = AutopilotOutput {
            job: &job,
            passed,
            rounds,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_job(&job, "Autopilot", ctx.verbose);
        let verdict = if passed {
            Style::new().green().apply_to(format!("✓ checks passing after {rounds} round(s)"))
        } else {
            Style::new().yellow().apply_to(format!("✗ checks not passing after {rounds} round(s)"))
        };
        println!("  {}", verdict);
        println!();
    }

    if job.status != JobStatus::Completed {
        anyhow::bail!("Autopilot ended {}", job.status);
    }
    Ok(())
}
