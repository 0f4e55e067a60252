//! Health command - shows engine health and metrics.

use anyhow::Result;
use clap::Args;
use conductor_engine::{HealthReport, HealthStatus, MetricsSnapshot};
use console::{Style, style};
use serde::Serialize;

use super::Context;

/// Arguments for the health command.
#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Include per-workflow metrics
    #[arg(short, long)]
    pub detailed: bool,
}

/// Health response for JSON output.
#[derive(Debug, Serialize)]
struct HealthOutput<'a> {
    health: &'a HealthReport,
    metrics: &'a MetricsSnapshot,
}

/// Run the health command.
pub async fn run(args: HealthArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.build_engine()?;
    let health = engine.get_health_status();
    let metrics = engine.get_metrics();

    if ctx.json_output {
        let output = HealthOutput {
            health: &health,
            metrics: &metrics,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let green = Style::new().green();
    let red = Style::new().red();

    println!();
    println!("{}", style("Conductor Engine Health").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    let status = match health.status {
        HealthStatus::Healthy => green.apply_to("● healthy"),
        HealthStatus::Degraded => red.apply_to("● degraded"),
    };
    println!("  {} {}", dim.apply_to("Status:"), status);
    for (check, ok) in &health.checks {
        let mark = if *ok {
            green.apply_to("✓")
        } else {
            red.apply_to("✗")
        };
        println!("    {} {}", mark, check);
    }
    println!(
        "  {} {}",
        dim.apply_to("Workflows:"),
        health.registered_workflows
    );
    println!(
        "  {} {}",
        dim.apply_to("Output dir:"),
        engine.config().output_dir.display()
    );

    println!();
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!(
        "  {} {} total, {} active, {} completed, {} failed",
        dim.apply_to("Jobs:"),
        metrics.total_jobs,
        metrics.active_jobs,
        metrics.completed_jobs,
        metrics.failed_jobs
    );
    println!(
        "  {} {:.1}%",
        dim.apply_to("Success rate:"),
        metrics.success_rate
    );

    if args.detailed {
        println!();
        for (id, wf) in &metrics.workflows {
            println!(
                "  {:<24} {} total, {:.1}% success, {:.0} ms avg",
                id, wf.total, wf.success_rate, wf.average_duration_ms
            );
        }
    }
    println!();

    Ok(())
}
