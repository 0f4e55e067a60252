//! Single-workflow execution.
//!
//! The executor drives one job from Pending to a terminal state:
//!
//! 1. mark Running and stamp the start time
//! 2. run the resolved command, retrying up to the definition's
//!    `retry_attempts` extra times
//! 3. write the full captured output to the job's log artifact
//! 4. record Completed or Failed with a trailing output excerpt
//!
//! Every failure on this path ends in a Failed record; nothing is returned to
//! the caller that started the job.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::artifacts::LogArtifacts;
use crate::definition::{WorkflowDefinition, WorkflowOverride};
use crate::job::{JobStatus, JobUpdate, trailing_excerpt};
use crate::runner::{CommandRunner, RunFailure};
use crate::store::JobStore;

/// Knobs shared by every run.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub default_timeout: Duration,
    pub excerpt_chars: usize,
    pub retry_delay: Duration,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(300),
            excerpt_chars: 1000,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Runs workflow jobs against a [`CommandRunner`].
#[derive(Clone)]
pub struct Executor {
    store: Arc<JobStore>,
    artifacts: Arc<LogArtifacts>,
    runner: Arc<dyn CommandRunner>,
    settings: ExecutionSettings,
}

impl Executor {
    pub fn new(
        store: Arc<JobStore>,
        artifacts: Arc<LogArtifacts>,
        runner: Arc<dyn CommandRunner>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            store,
            artifacts,
            runner,
            settings,
        }
    }

    /// Execute `definition` for the existing job `job_id`.
    pub async fn run_job(
        &self,
        job_id: &str,
        definition: &WorkflowDefinition,
        overrides: Option<&WorkflowOverride>,
    ) {
        if let Err(e) = self.store.apply_update(job_id, JobUpdate::running()) {
            warn!(job_id = %job_id, error = %e, "Cannot start job");
            return;
        }

        let spec = definition.resolve(overrides, self.settings.default_timeout);
        let max_attempts = definition.retry_attempts.unwrap_or(0).saturating_add(1);
        info!(
            job_id = %job_id,
            workflow_id = %definition.id,
            command = %spec.display(),
            max_attempts,
            "Workflow started"
        );

        let mut log = String::new();
        let mut attempt = 0;
        let outcome: Result<(), RunFailure> = loop {
            attempt += 1;
            if max_attempts > 1 {
                log.push_str(&format!("=== attempt {attempt}/{max_attempts} ===\n"));
            }

            match self.runner.run(&spec).await {
                Ok(output) => {
                    log.push_str(&output.combined());
                    break Ok(());
                }
                Err(failure) => {
                    log.push_str(&failure.output);
                    if attempt >= max_attempts {
                        break Err(failure);
                    }
                    if self.store.status(job_id) != Some(JobStatus::Running) {
                        debug!(job_id = %job_id, "Job no longer running, skipping retry");
                        break Err(failure);
                    }
                    warn!(
                        job_id = %job_id,
                        attempt,
                        max_attempts,
                        error = %failure.message,
                        "Workflow attempt failed, retrying"
                    );
                    if !log.ends_with('\n') {
                        log.push('\n');
                    }
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
            }
        };

        let excerpt = trailing_excerpt(&log, self.settings.excerpt_chars);
        let update = match outcome {
            Ok(()) => match self.artifacts.write(job_id, &log).await {
                Ok(path) => {
                    info!(job_id = %job_id, log = %path.display(), attempts = attempt, "Workflow completed");
                    JobUpdate::completed(excerpt)
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Failed to write job log");
                    JobUpdate::failed(format!("Failed to write job log: {e}"), excerpt)
                }
            },
            Err(failure) => {
                // The run failure is what gets reported, not the log write.
                if let Err(e) = self.artifacts.write(job_id, &log).await {
                    warn!(job_id = %job_id, error = %e, "Failed to write job log");
                }
                warn!(job_id = %job_id, attempts = attempt, error = %failure.message, "Workflow failed");
                JobUpdate::failed(failure.message, excerpt)
            }
        };

        if let Err(e) = self
            .store
            .apply_update(job_id, update.with_metadata("attempts", attempt))
        {
            warn!(job_id = %job_id, error = %e, "Failed to record job result");
        }
    }
}
