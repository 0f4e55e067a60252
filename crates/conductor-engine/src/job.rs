//! Job records and the lifecycle state machine.
//!
//! ```text
//! Pending ──► Running ──► Completed
//!    │           ├──────► Failed
//!    │           └──────► Stopped
//!    └──► Failed | Stopped
//! ```
//!
//! Terminal states have no outgoing transitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Free-form job metadata.
pub type Metadata = serde_json::Map<String, Value>;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    /// Whether no further transitions are allowed.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Stopped
        )
    }

    /// Whether moving from `self` to `next` is a defined transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending => matches!(
                next,
                JobStatus::Running | JobStatus::Failed | JobStatus::Stopped
            ),
            JobStatus::Running => next.is_terminal(),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Stopped => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of a workflow (or of the autopilot sentinel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub workflow_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Progress percentage (0-100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Trailing excerpt of captured output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Job {
    /// Create a new pending job with a fresh identifier.
    pub fn new(workflow_id: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            start_time: None,
            end_time: None,
            progress: None,
            output: None,
            error: None,
            metadata,
        }
    }

    /// Wall-clock duration, when both endpoints are recorded.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Merge a partial update into this record.
    ///
    /// Only fields present in the update are written. A status change that is
    /// not a defined transition is dropped together with the update's end
    /// time; the remaining fields still merge. Returns whether the status
    /// part of the update (if any) was accepted.
    pub fn apply(&mut self, update: JobUpdate) -> bool {
        let mut accepted = true;
        let mut end_time = update.end_time;

        if let Some(next) = update.status
            && next != self.status
        {
            if self.status.can_transition_to(next) {
                self.status = next;
            } else {
                accepted = false;
                end_time = None;
            }
        }

        if let Some(start) = update.start_time {
            self.start_time = Some(start);
        }
        if let Some(end) = end_time {
            self.end_time = Some(end);
        }
        if let Some(progress) = update.progress {
            self.progress = Some(progress.min(100));
        }
        if let Some(output) = update.output {
            self.output = Some(output);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        for (key, value) in update.metadata {
            self.metadata.insert(key, value);
        }

        accepted
    }
}

/// A partial job update. Absent fields leave the record untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub progress: Option<u8>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub metadata: Metadata,
}

impl JobUpdate {
    /// Transition to Running, stamping the start time.
    pub fn running() -> Self {
        Self {
            status: Some(JobStatus::Running),
            start_time: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Transition to Completed with full progress and an output excerpt.
    pub fn completed(output: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            end_time: Some(Utc::now()),
            progress: Some(100),
            output: Some(output.into()),
            ..Default::default()
        }
    }

    /// Transition to Failed with an error and an output excerpt.
    pub fn failed(error: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            end_time: Some(Utc::now()),
            output: Some(output.into()),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Transition to Stopped.
    pub fn stopped() -> Self {
        Self {
            status: Some(JobStatus::Stopped),
            end_time: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Progress-only update.
    pub fn progress(percent: u8) -> Self {
        Self {
            progress: Some(percent),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Last `max_chars` characters of `text`, on a character boundary.
pub fn trailing_excerpt(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    text.chars().skip(total - max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new("echo-ok", Metadata::new())
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = job();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.start_time.is_none());
        assert!(job.duration().is_none());
        assert_eq!(Uuid::parse_str(&job.id).unwrap().get_version_num(), 4);
    }

    #[test]
    fn test_transitions() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Stopped));
        assert!(!Running.can_transition_to(Pending));
        for terminal in [Completed, Failed, Stopped] {
            assert!(terminal.is_terminal());
            for next in [Pending, Running, Completed, Failed, Stopped] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_apply_merges_only_present_fields() {
        let mut job = job();
        assert!(job.apply(JobUpdate::running()));
        let started = job.start_time;

        job.apply(JobUpdate::progress(40).with_metadata("round", 2));
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.start_time, started);
        assert_eq!(job.progress, Some(40));
        assert_eq!(job.metadata["round"], serde_json::json!(2));

        job.apply(JobUpdate::completed("done"));
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.start_time, started);
        assert_eq!(job.progress, Some(100));
        assert_eq!(job.output.as_deref(), Some("done"));
        assert_eq!(job.metadata["round"], serde_json::json!(2));
        assert!(job.duration().is_some());
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut job = job();
        job.apply(JobUpdate::running());
        job.apply(JobUpdate::stopped());
        let stopped_at = job.end_time;

        let accepted = job.apply(JobUpdate::completed("late output"));
        assert!(!accepted);
        assert_eq!(job.status, JobStatus::Stopped);
        assert_eq!(job.end_time, stopped_at);
        // Non-status fields still merge
        assert_eq!(job.output.as_deref(), Some("late output"));
    }

    #[test]
    fn test_progress_clamped() {
        let mut job = job();
        job.apply(JobUpdate::progress(250));
        assert_eq!(job.progress, Some(100));
    }

    #[test]
    fn test_trailing_excerpt() {
        assert_eq!(trailing_excerpt("short", 1000), "short");
        assert_eq!(trailing_excerpt("abcdef", 3), "def");
        // Multi-byte characters are never split
        assert_eq!(trailing_excerpt("ééééé", 2), "éé");
        let long = "x".repeat(5000) + "END";
        let excerpt = trailing_excerpt(&long, 1000);
        assert_eq!(excerpt.chars().count(), 1000);
        assert!(excerpt.ends_with("END"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(JobStatus::Completed).unwrap(),
            serde_json::json!("completed")
        );
        assert_eq!(JobStatus::Stopped.to_string(), "stopped");
    }
}
