//! Daemon command - runs configured schedules until interrupted.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use conductor_config::ScheduleEntry;
use conductor_engine::WorkflowOverride;
use console::{Style, style};

use super::Context;

/// Arguments for the daemon command.
#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Seconds between metrics log lines
    #[arg(long, default_value_t = 60)]
    pub metrics_interval_secs: u64,

    /// Extra schedule as WORKFLOW@EXPRESSION, e.g. "quality-gates@every 1 hour" (repeatable)
    #[arg(long = "schedule", value_name = "WORKFLOW@EXPRESSION")]
    pub schedules: Vec<String>,
}

fn schedule_override(entry: &ScheduleEntry) -> Option<WorkflowOverride> {
    if entry.args.is_none() && entry.timeout_secs.is_none() {
        return None;
    }
    Some(WorkflowOverride {
        args: entry.args.clone(),
        env: None,
        timeout_secs: entry.timeout_secs,
    })
}

fn parse_schedule_flag(flag: &str) -> Result<ScheduleEntry> {
    let (workflow, every) = flag
        .split_once('@')
        .ok_or_else(|| anyhow::anyhow!("Invalid --schedule '{}': expected WORKFLOW@EXPRESSION", flag))?;
    Ok(ScheduleEntry {
        workflow: workflow.trim().to_string(),
        every: every.trim().to_string(),
        args: None,
        timeout_secs: None,
    })
}

/// Run the daemon command.
pub async fn run(args: DaemonArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.build_engine()?;

    let mut entries = ctx.config.schedules.clone();
    for flag in &args.schedules {
        entries.push(parse_schedule_flag(flag)?);
    }

    for entry in &entries {
        let schedule_id =
            engine.schedule_workflow(&entry.workflow, &entry.every, schedule_override(entry))?;
        tracing::info!(
            schedule_id = %schedule_id,
            workflow_id = %entry.workflow,
            every = %entry.every,
            "Registered schedule"
        );
    }

    if entries.is_empty() {
        tracing::warn!("No schedules configured; the daemon will only report metrics");
    }

    if !ctx.json_output {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Conductor Daemon").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!();
        for schedule in engine.list_schedules() {
            println!(
                "  {} {}",
                Style::new().cyan().apply_to(&schedule.workflow_id),
                dim.apply_to(&schedule.expression)
            );
        }
        println!();
        println!("  {}", dim.apply_to("Press Ctrl-C to stop"));
        println!();
    }

    let period = Duration::from_secs(args.metrics_interval_secs.max(1));
    let mut metrics_timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                break;
            }
            _ = metrics_timer.tick() => {
                let m = engine.get_metrics();
                tracing::info!(
                    total = m.total_jobs,
                    active = m.active_jobs,
                    completed = m.completed_jobs,
                    failed = m.failed_jobs,
                    success_rate = m.success_rate,
                    "Engine metrics"
                );
            }
        }
    }

    // ── Graceful shutdown ──────────────────────────────────────────────
    let cancelled = engine.shutdown();
    let metrics = engine.get_metrics();
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        println!(
            "Stopped {} schedule(s); {} job(s) run, {} still active",
            cancelled, metrics.total_jobs, metrics.active_jobs
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schedule_flag() {
        let entry = parse_schedule_flag("quality-gates@every 1 hour").unwrap();
        assert_eq!(entry.workflow, "quality-gates");
        assert_eq!(entry.every, "every 1 hour");
        assert!(parse_schedule_flag("no-separator").is_err());
    }

    #[test]
    fn test_schedule_override() {
        let mut entry = parse_schedule_flag("wf@every 5 minutes").unwrap();
        assert!(schedule_override(&entry).is_none());
        entry.timeout_secs = Some(30);
        let o = schedule_override(&entry).unwrap();
        assert_eq!(o.timeout_secs, Some(30));
        assert!(o.args.is_none());
    }
}
