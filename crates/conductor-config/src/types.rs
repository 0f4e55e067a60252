//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [engine]                 # executor and storage tuning
//! [autopilot]              # default autopilot session settings
//! [logging]                # log file output
//!
//! [[workflows]]            # additional (or replacement) workflow definitions
//! id = "echo-ok"
//! command = "echo"
//! args = ["OK"]
//!
//! [[schedules]]            # recurring starts
//! workflow = "quality-gates"
//! every = "every 30 minutes"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    /// Engine configuration.
    pub engine: Option<EngineSection>,

    /// Autopilot defaults.
    pub autopilot: Option<AutopilotSection>,

    /// Log file configuration.
    pub logging: Option<LoggingSection>,

    /// Workflow definitions registered after the built-in catalog.
    pub workflows: Vec<WorkflowEntry>,

    /// Recurring schedules registered by the daemon.
    pub schedules: Vec<ScheduleEntry>,
}

impl ConductorConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string and validate.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        let config: ConductorConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Check declared workflows and schedules for missing required values.
    pub fn validate(&self) -> crate::Result<()> {
        let mut seen = std::collections::HashSet::new();
        for (idx, wf) in self.workflows.iter().enumerate() {
            if wf.id.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: "id".to_string(),
                    context: format!("workflows[{idx}]"),
                });
            }
            if wf.command.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: "command".to_string(),
                    context: format!("workflow '{}'", wf.id),
                });
            }
            if !seen.insert(wf.id.as_str()) {
                return Err(ConfigError::DuplicateWorkflow(wf.id.clone()));
            }
        }

        for (idx, schedule) in self.schedules.iter().enumerate() {
            if schedule.workflow.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: "workflow".to_string(),
                    context: format!("schedules[{idx}]"),
                });
            }
        }

        Ok(())
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced wholesale. Workflows are merged by id; schedules
    /// from the later layer are appended.
    pub fn merge(&mut self, other: ConductorConfig) {
        if other.engine.is_some() {
            self.engine = other.engine;
        }

        if other.autopilot.is_some() {
            self.autopilot = other.autopilot;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }

        for wf in other.workflows {
            match self.workflows.iter_mut().find(|existing| existing.id == wf.id) {
                Some(existing) => *existing = wf,
                None => self.workflows.push(wf),
            }
        }

        self.schedules.extend(other.schedules);
    }

    /// Engine section, or defaults when absent.
    pub fn engine_or_default(&self) -> EngineSection {
        self.engine.clone().unwrap_or_default()
    }

    /// Autopilot section, or defaults when absent.
    pub fn autopilot_or_default(&self) -> AutopilotSection {
        self.autopilot.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Engine configuration section.
///
/// ```toml
/// [engine]
/// output_dir = "workflow-logs"
/// default_timeout_secs = 300
/// max_output_bytes = 10485760
/// excerpt_chars = 1000
/// round_delay_ms = 5000
/// retry_delay_ms = 1000
/// seed_builtin_workflows = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Directory receiving one `<job_id>.log` file per job.
    pub output_dir: PathBuf,
    /// Timeout applied when neither the caller nor the workflow sets one.
    pub default_timeout_secs: u64,
    /// Per-stream capture limit for process output.
    pub max_output_bytes: usize,
    /// Number of trailing characters kept on the job record.
    pub excerpt_chars: usize,
    /// Pause between autopilot rounds.
    pub round_delay_ms: u64,
    /// Pause between retry attempts of a failing workflow.
    pub retry_delay_ms: u64,
    /// Register the built-in workflow catalog at initialization.
    pub seed_builtin_workflows: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("workflow-logs"),
            default_timeout_secs: 300,
            max_output_bytes: 10 * 1024 * 1024,
            excerpt_chars: 1000,
            round_delay_ms: 5000,
            retry_delay_ms: 1000,
            seed_builtin_workflows: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Autopilot Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default settings for autopilot sessions started from the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotSection {
    /// Upper bound on rounds.
    pub max_rounds: u32,
    /// Run the compliance-check workflow each round.
    pub compliance_check: bool,
    /// Workflow run after a failing round, before the next one.
    pub remediation_workflow: Option<String>,
}

impl Default for AutopilotSection {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            compliance_check: true,
            remediation_workflow: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Write a daily-rolling JSON log file in addition to the console.
    pub file: bool,
    /// Directory for log files. Defaults to `<config dir>/logs`.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            file: true,
            directory: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Workflows and Schedules
// ─────────────────────────────────────────────────────────────────────────────

/// A workflow declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEntry {
    /// Unique workflow identifier.
    pub id: String,
    /// Display name. Defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Executable to launch.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variable overrides.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Execution timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Extra attempts after a failed run.
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    /// Working directory for the process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// A recurring schedule declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Workflow to start on each tick.
    pub workflow: String,
    /// Interval expression, e.g. `"every 15 minutes"`.
    pub every: String,
    /// Argument override for the scheduled runs.
    #[serde(default)]
    pub args: Option<Vec<String>>,
    /// Timeout override for the scheduled runs.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}
