//! Run command - starts one workflow and waits for it.

use std::collections::BTreeMap;

use anyhow::Result;
use clap::Args;
use conductor_engine::{JobStatus, WorkflowOverride};

use super::{Context, print_job, wait_for_job};

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Workflow id
    pub workflow: String,

    /// Replace the workflow's arguments (repeatable)
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Replace the workflow's environment overrides (repeatable, KEY=VALUE)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// Execution timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl RunArgs {
    fn overrides(&self) -> Option<WorkflowOverride> {
        if self.args.is_empty() && self.env.is_empty() && self.timeout_secs.is_none() {
            return None;
        }
        let mut overrides = WorkflowOverride::default();
        if !self.args.is_empty() {
            overrides = overrides.with_args(self.args.iter().cloned());
        }
        if !self.env.is_empty() {
            overrides = overrides.with_env(self.env.iter().cloned().collect::<BTreeMap<_, _>>());
        }
        if let Some(secs) = self.timeout_secs {
            overrides = overrides.with_timeout_secs(secs);
        }
        Some(overrides)
    }
}

/// Run the run command.
pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.build_engine()?;

    let job_id = engine.start_workflow(&args.workflow, args.overrides())?;
    tracing::info!(job_id = %job_id, workflow_id = %args.workflow, "Started workflow");

    let job = wait_for_job(&engine, &job_id).await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        print_job(&job, "Workflow Run", ctx.verbose);
    }

    if job.status != JobStatus::Completed {
        anyhow::bail!(
            "Workflow '{}' {}: {}",
            args.workflow,
            job.status,
            job.error.as_deref().unwrap_or("no error recorded")
        );
    }
    Ok(())
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{s}'"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
