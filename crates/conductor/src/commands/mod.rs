//! CLI command handlers.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use conductor_config::ConductorConfig;
use conductor_engine::{Engine, EngineConfig, Job, WorkflowDefinition};
use console::{Style, style};

pub mod autopilot;
pub mod daemon;
pub mod health;
pub mod run;
pub mod workflows;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Project directory, if given. Relative output paths resolve against it.
    pub project_dir: Option<PathBuf>,
    /// Merged configuration.
    pub config: ConductorConfig,
}

impl Context {
    /// Build and initialize an engine from the loaded configuration.
    ///
    /// Configured workflows are registered after the built-ins, so they can
    /// replace them.
    pub fn build_engine(&self) -> Result<Engine> {
        let section = self.config.engine_or_default();
        let mut engine_config = EngineConfig::from(&section);
        if engine_config.output_dir.is_relative()
            && let Some(dir) = &self.project_dir
        {
            engine_config.output_dir = dir.join(&engine_config.output_dir);
        }

        let engine = Engine::new(engine_config);
        engine.initialize()?;
        for entry in &self.config.workflows {
            engine.register_workflow(WorkflowDefinition::from(entry.clone()));
        }
        tracing::debug!(
            workflows = engine.list_workflows().len(),
            "Engine ready"
        );
        Ok(engine)
    }
}

/// Poll a job until it reaches a terminal state.
pub async fn wait_for_job(engine: &Engine, job_id: &str) -> Result<Job> {
    loop {
        let job = engine
            .get_workflow_status(job_id)
            .ok_or_else(|| anyhow::anyhow!("Job disappeared: {}", job_id))?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Human-readable summary of a finished job.
pub fn print_job(job: &Job, title: &str, verbose: bool) {
    let dim = Style::new().dim();
    let status_style = match job.status {
        conductor_engine::JobStatus::Completed => Style::new().green(),
        conductor_engine::JobStatus::Failed => Style::new().red(),
        _ => Style::new().yellow(),
    };

    println!();
    println!("{}", style(title).bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("Job:"), job.id);
    println!("  {} {}", dim.apply_to("Workflow:"), job.workflow_id);
    println!(
        "  {} {}",
        dim.apply_to("Status:"),
        status_style.apply_to(format!("● {}", job.status))
    );
    if let Some(duration) = job.duration() {
        println!(
            "  {} {:.2}s",
            dim.apply_to("Duration:"),
            duration.num_milliseconds() as f64 / 1000.0
        );
    }
    if let Some(error) = &job.error {
        println!("  {} {}", dim.apply_to("Error:"), Style::new().red().apply_to(error));
    }
    if verbose && !job.metadata.is_empty() {
        println!(
            "  {} {}",
            dim.apply_to("Metadata:"),
            serde_json::Value::Object(job.metadata.clone())
        );
    }

    if let Some(output) = job.output.as_deref().filter(|o| !o.is_empty()) {
        println!();
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("{}", output.trim_end());
    }
    println!();
}
