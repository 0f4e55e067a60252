//! Workflow definitions and caller-supplied overrides.
//!
//! A [`WorkflowDefinition`] is an immutable command template. A
//! [`WorkflowOverride`] is shallow-merged on top of it when a job starts:
//! every field present in the override replaces the definition's field.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use conductor_config::WorkflowEntry;
use serde::{Deserialize, Serialize};

use crate::runner::CommandSpec;

/// An executable workflow template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique workflow identifier.
    pub id: String,
    /// Display name.
    pub name: String,
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
    /// Execution timeout in seconds. Falls back to the engine default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Extra attempts after a failed run.
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    /// Working directory for the process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl WorkflowDefinition {
    /// Create a definition with the given id and command. The display name
    /// defaults to the id.
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout_secs: None,
            retry_attempts: None,
            working_dir: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Build the concrete command for one run.
    ///
    /// Timeout precedence: override, then definition, then `default_timeout`.
    pub fn resolve(
        &self,
        overrides: Option<&WorkflowOverride>,
        default_timeout: Duration,
    ) -> CommandSpec {
        let args = overrides
            .and_then(|o| o.args.clone())
            .unwrap_or_else(|| self.args.clone());
        let env = overrides
            .and_then(|o| o.env.clone())
            .unwrap_or_else(|| self.env.clone());
        let timeout = overrides
            .and_then(|o| o.timeout_secs)
            .or(self.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(default_timeout);

        CommandSpec {
            program: self.command.clone(),
            args,
            env,
            working_dir: self.working_dir.clone(),
            timeout,
        }
    }
}

impl From<WorkflowEntry> for WorkflowDefinition {
    fn from(entry: WorkflowEntry) -> Self {
        Self {
            name: entry.name.unwrap_or_else(|| entry.id.clone()),
            id: entry.id,
            description: entry.description,
            command: entry.command,
            args: entry.args,
            env: entry.env,
            timeout_secs: entry.timeout_secs,
            retry_attempts: entry.retry_attempts,
            working_dir: entry.working_dir,
        }
    }
}

/// Caller-supplied partial configuration for a single start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOverride {
    /// Replacement argument list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Replacement environment map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    /// Replacement timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl WorkflowOverride {
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Override rendered as job metadata.
    pub fn to_metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}
