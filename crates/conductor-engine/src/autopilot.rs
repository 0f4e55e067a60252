//! Autopilot: bounded compliance-check rounds.
//!
//! Each round runs the `compliance-check` workflow inline and scans its
//! output for failure markers. A clean round ends the loop early. Round
//! errors are written into the transcript and the loop moves on; the
//! autopilot job itself always finishes as Completed, with a `passed` flag in
//! its metadata.
//!
//! "error" counts as a failure marker, but a plural "errors" only does when
//! preceded by a non-zero count, so summaries like "0 errors" still pass.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use conductor_config::AutopilotSection;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifacts::LogArtifacts;
use crate::job::{JobUpdate, Metadata, trailing_excerpt};
use crate::registry::{COMPLIANCE_CHECK, WorkflowRegistry};
use crate::runner::{CommandRunner, RunFailure};
use crate::store::JobStore;

/// Sentinel workflow id recorded on autopilot jobs.
pub const AUTOPILOT_WORKFLOW_ID: &str = "autopilot";

/// Marker appended to the transcript after a clean round.
pub const ALL_CHECKS_PASSING: &str = "All checks passing";

const FAILURE_PATTERNS: &[&str] = &[
    r"\bfail(?:s|ed|ure|ures|ing)?\b",
    r"\berror\b",
    r"\b[1-9]\d*\s+errors\b",
    r"\bcritical\b",
    r"❌",
    r"✗",
];

static FAILURE_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    FAILURE_PATTERNS
        .iter()
        .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
        .collect()
});

/// Failure markers found in compliance output, in pattern order.
pub fn failure_markers(output: &str) -> Vec<String> {
    FAILURE_MARKERS
        .iter()
        .filter_map(|re| re.find(output).map(|m| m.as_str().to_string()))
        .collect()
}

/// Whether compliance output contains no failure markers.
pub fn is_passing(output: &str) -> bool {
    FAILURE_MARKERS.iter().all(|re| !re.is_match(output))
}

/// Per-run autopilot options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    pub max_rounds: u32,
    pub compliance_check: bool,
    /// Workflow to run after each failing round, before the next one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation_workflow: Option<String>,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            compliance_check: true,
            remediation_workflow: None,
        }
    }
}

impl AutopilotConfig {
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }

    pub fn with_compliance_check(mut self, enabled: bool) -> Self {
        self.compliance_check = enabled;
        self
    }

    pub fn with_remediation_workflow(mut self, id: impl Into<String>) -> Self {
        self.remediation_workflow = Some(id.into());
        self
    }

    /// Rounds actually run; zero is treated as one.
    pub fn effective_rounds(&self) -> u32 {
        self.max_rounds.max(1)
    }

    pub(crate) fn to_metadata(&self) -> Metadata {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Metadata::new(),
        }
    }
}

impl From<&AutopilotSection> for AutopilotConfig {
    fn from(section: &AutopilotSection) -> Self {
        Self {
            max_rounds: section.max_rounds,
            compliance_check: section.compliance_check,
            remediation_workflow: section.remediation_workflow.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutopilotSettings {
    pub round_delay: Duration,
    pub default_timeout: Duration,
    pub excerpt_chars: usize,
}

impl Default for AutopilotSettings {
    fn default() -> Self {
        Self {
            round_delay: Duration::from_secs(5),
            default_timeout: Duration::from_secs(300),
            excerpt_chars: 1000,
        }
    }
}

/// Drives an autopilot job.
pub struct Autopilot {
    store: Arc<JobStore>,
    artifacts: Arc<LogArtifacts>,
    registry: Arc<WorkflowRegistry>,
    runner: Arc<dyn CommandRunner>,
    settings: AutopilotSettings,
}

impl Autopilot {
    pub fn new(
        store: Arc<JobStore>,
        artifacts: Arc<LogArtifacts>,
        registry: Arc<WorkflowRegistry>,
        runner: Arc<dyn CommandRunner>,
        settings: AutopilotSettings,
    ) -> Self {
        Self {
            store,
            artifacts,
            registry,
            runner,
            settings,
        }
    }

    pub async fn run(&self, job_id: &str, config: &AutopilotConfig) {
        if let Err(e) = self.store.apply_update(job_id, JobUpdate::running()) {
            warn!(job_id = %job_id, error = %e, "Cannot start autopilot job");
            return;
        }

        let max_rounds = config.effective_rounds();
        info!(job_id = %job_id, max_rounds, compliance_check = config.compliance_check, "Autopilot started");

        let mut transcript = String::new();
        let mut passed = false;
        let mut rounds_run = 0;

        for round in 1..=max_rounds {
            rounds_run = round;
            let progress = (u64::from(round) * 100 / u64::from(max_rounds)).min(100) as u8;
            self.update(
                job_id,
                JobUpdate::progress(progress).with_metadata("round", round),
            );
            transcript.push_str(&format!("=== Autopilot round {round}/{max_rounds} ===\n"));

            if !config.compliance_check {
                transcript.push_str("Compliance check skipped\n");
            } else {
                match self.run_inline(COMPLIANCE_CHECK).await {
                    Ok(output) => {
                        push_line(&mut transcript, &output);
                        if is_passing(&output) {
                            transcript.push_str(&format!(
                                "✅ {ALL_CHECKS_PASSING} after round {round}\n"
                            ));
                            passed = true;
                            info!(job_id = %job_id, round, "Autopilot checks passing");
                            break;
                        }
                        let markers = failure_markers(&output);
                        transcript.push_str(&format!(
                            "Compliance issues detected: {}\n",
                            markers.join(", ")
                        ));
                        debug!(job_id = %job_id, round, ?markers, "Compliance issues detected");
                    }
                    Err(failure) => {
                        push_line(&mut transcript, &failure.output);
                        transcript.push_str(&format!("Round {round} error: {}\n", failure.message));
                        warn!(job_id = %job_id, round, error = %failure.message, "Autopilot round failed");
                    }
                }

                if round < max_rounds
                    && let Some(remediation) = &config.remediation_workflow
                {
                    transcript.push_str(&format!("--- remediation: {remediation} ---\n"));
                    match self.run_inline(remediation).await {
                        Ok(output) => push_line(&mut transcript, &output),
                        Err(failure) => {
                            push_line(&mut transcript, &failure.output);
                            transcript
                                .push_str(&format!("Remediation error: {}\n", failure.message));
                        }
                    }
                }
            }

            if round < max_rounds {
                tokio::time::sleep(self.settings.round_delay).await;
            }
        }

        if let Err(e) = self.artifacts.write(job_id, &transcript).await {
            warn!(job_id = %job_id, error = %e, "Failed to write autopilot log");
        }

        let excerpt = trailing_excerpt(&transcript, self.settings.excerpt_chars);
        self.update(
            job_id,
            JobUpdate::completed(excerpt)
                .with_metadata("round", rounds_run)
                .with_metadata("passed", passed),
        );
        info!(job_id = %job_id, rounds = rounds_run, passed, "Autopilot finished");
    }

    /// Run a registered workflow in-line, without creating a job for it.
    async fn run_inline(&self, workflow_id: &str) -> Result<String, RunFailure> {
        let definition = self
            .registry
            .get(workflow_id)
            .ok_or_else(|| RunFailure::new(format!("Workflow not found: {workflow_id}")))?;
        let spec = definition.resolve(None, self.settings.default_timeout);
        self.runner.run(&spec).await.map(|out| out.combined())
    }

    fn update(&self, job_id: &str, update: JobUpdate) {
        if let Err(e) = self.store.apply_update(job_id, update) {
            warn!(job_id = %job_id, error = %e, "Failed to update autopilot job");
        }
    }
}

fn push_line(transcript: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    transcript.push_str(text);
    if !text.ends_with('\n') {
        transcript.push('\n');
    }
}
