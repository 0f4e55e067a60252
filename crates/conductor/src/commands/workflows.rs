//! Workflows command - lists registered workflows.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::Context;

/// Arguments for the workflows command.
#[derive(Args, Debug)]
pub struct WorkflowsArgs {
    /// Show command lines and timeouts
    #[arg(short, long)]
    pub detailed: bool,
}

/// Run the workflows command.
pub async fn run(args: WorkflowsArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.build_engine()?;
    let workflows = engine.list_workflows();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&workflows)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let cyan = Style::new().cyan();

    println!();
    println!("{}", style("Workflows").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();

    if workflows.is_empty() {
        println!("  {}", dim.apply_to("No workflows registered"));
        println!();
        return Ok(());
    }

    let default_timeout = engine.config().default_timeout.as_secs();
    for wf in &workflows {
        println!("  {} {}", cyan.apply_to(&wf.id), dim.apply_to(&wf.name));
        if !wf.description.is_empty() {
            println!("    {}", wf.description);
        }
        if args.detailed || ctx.verbose {
            let command = std::iter::once(wf.command.as_str())
                .chain(wf.args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ");
            println!("    {} {}", dim.apply_to("command:"), command);
            println!(
                "    {} {}s",
                dim.apply_to("timeout:"),
                wf.timeout_secs.unwrap_or(default_timeout)
            );
            if let Some(retries) = wf.retry_attempts {
                println!("    {} {}", dim.apply_to("retries:"), retries);
            }
        }
    }
    println!();

    Ok(())
}
