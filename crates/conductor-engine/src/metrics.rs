//! Aggregate job metrics and engine health.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::job::{Job, JobStatus};

/// Counts and rates for one workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowMetrics {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub stopped: usize,
    pub pending: usize,
    /// Percentage of jobs that completed (0-100).
    pub success_rate: f64,
    /// Mean run time of completed jobs, in milliseconds.
    pub average_duration_ms: f64,
}

/// Engine-wide metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_jobs: usize,
    pub active_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub stopped_jobs: usize,
    pub pending_jobs: usize,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    /// Per registered workflow.
    pub workflows: BTreeMap<String, WorkflowMetrics>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tally {
    total: usize,
    active: usize,
    completed: usize,
    failed: usize,
    stopped: usize,
    pending: usize,
    duration_ms_sum: f64,
    duration_samples: usize,
}

impl Tally {
    fn add(&mut self, job: &Job) {
        self.total += 1;
        match job.status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.active += 1,
            JobStatus::Completed => {
                self.completed += 1;
                if let Some(d) = job.duration() {
                    self.duration_ms_sum += d.num_milliseconds().max(0) as f64;
                    self.duration_samples += 1;
                }
            }
            JobStatus::Failed => self.failed += 1,
            JobStatus::Stopped => self.stopped += 1,
        }
    }

    fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }

    fn average_duration_ms(&self) -> f64 {
        if self.duration_samples == 0 {
            0.0
        } else {
            self.duration_ms_sum / self.duration_samples as f64
        }
    }

    fn into_workflow_metrics(self) -> WorkflowMetrics {
        WorkflowMetrics {
            success_rate: self.success_rate(),
            average_duration_ms: self.average_duration_ms(),
            total: self.total,
            active: self.active,
            completed: self.completed,
            failed: self.failed,
            stopped: self.stopped,
            pending: self.pending,
        }
    }
}

/// Compute metrics over `jobs`, with a breakdown for each id in
/// `workflow_ids`. Jobs whose workflow is not listed (the autopilot
/// sentinel, for instance) count toward the totals only.
pub fn compute_metrics<'a>(
    jobs: &[Job],
    workflow_ids: impl IntoIterator<Item = &'a str>,
) -> MetricsSnapshot {
    let mut overall = Tally::default();
    let mut per_workflow: BTreeMap<String, Tally> = workflow_ids
        .into_iter()
        .map(|id| (id.to_string(), Tally::default()))
        .collect();

    for job in jobs {
        overall.add(job);
        if let Some(tally) = per_workflow.get_mut(&job.workflow_id) {
            tally.add(job);
        }
    }

    MetricsSnapshot {
        total_jobs: overall.total,
        active_jobs: overall.active,
        completed_jobs: overall.completed,
        failed_jobs: overall.failed,
        stopped_jobs: overall.stopped,
        pending_jobs: overall.pending,
        success_rate: overall.success_rate(),
        average_duration_ms: overall.average_duration_ms(),
        workflows: per_workflow
            .into_iter()
            .map(|(id, tally)| (id, tally.into_workflow_metrics()))
            .collect(),
        generated_at: Utc::now(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => f.write_str("healthy"),
            HealthStatus::Degraded => f.write_str("degraded"),
        }
    }
}

/// Health report. `status` is healthy only when every check passes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: BTreeMap<String, bool>,
    pub registered_workflows: usize,
    pub active_jobs: usize,
    pub total_jobs: usize,
    pub active_schedules: usize,
    pub checked_at: DateTime<Utc>,
}

/// Inputs to a health assessment.
#[derive(Debug, Clone, Default)]
pub struct HealthInputs {
    pub initialized: bool,
    pub registered_workflows: usize,
    pub output_dir_accessible: bool,
    pub active_jobs: usize,
    pub total_jobs: usize,
    pub active_schedules: usize,
}

pub fn assess_health(inputs: &HealthInputs) -> HealthReport {
    let checks = BTreeMap::from([
        ("initialized".to_string(), inputs.initialized),
        (
            "workflows_registered".to_string(),
            inputs.registered_workflows > 0,
        ),
        (
            "output_dir_accessible".to_string(),
            inputs.output_dir_accessible,
        ),
    ]);
    let status = if checks.values().all(|ok| *ok) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    HealthReport {
        status,
        checks,
        registered_workflows: inputs.registered_workflows,
        active_jobs: inputs.active_jobs,
        total_jobs: inputs.total_jobs,
        active_schedules: inputs.active_schedules,
        checked_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobUpdate, Metadata};

    fn job(workflow: &str, terminal: Option<JobUpdate>) -> Job {
        let mut job = Job::new(workflow, Metadata::new());
        if let Some(update) = terminal {
            job.apply(JobUpdate::running());
            job.apply(update);
        }
        job
    }

    #[test]
    fn test_empty_metrics() {
        let m = compute_metrics(&[], ["a"]);
        assert_eq!(m.total_jobs, 0);
        assert_eq!(m.success_rate, 0.0);
        assert_eq!(m.average_duration_ms, 0.0);
        assert_eq!(m.workflows["a"], WorkflowMetrics::default());
    }

    #[test]
    fn test_counts_and_rates() {
        let jobs = vec![
            job("a", Some(JobUpdate::completed(""))),
            job("a", Some(JobUpdate::completed(""))),
            job("a", Some(JobUpdate::failed("x", ""))),
            job("b", Some(JobUpdate::stopped())),
            job("b", Some(JobUpdate::default())),
            job("autopilot", None),
        ];
        let m = compute_metrics(&jobs, ["a", "b", "c"]);

        assert_eq!(m.total_jobs, 6);
        assert_eq!(m.completed_jobs, 2);
        assert_eq!(m.failed_jobs, 1);
        assert_eq!(m.stopped_jobs, 1);
        assert_eq!(m.active_jobs, 1);
        assert_eq!(m.pending_jobs, 1);
        assert!((m.success_rate - 100.0 / 3.0).abs() < 1e-9);

        let a = &m.workflows["a"];
        assert_eq!(a.total, 3);
        assert!((a.success_rate - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(m.workflows["b"].active, 1);
        assert_eq!(m.workflows["c"].total, 0);
        assert!(!m.workflows.contains_key("autopilot"));
    }

    #[test]
    fn test_average_duration_over_completed_only() {
        let start = Utc::now();
        let mut fast = Job::new("a", Metadata::new());
        fast.status = JobStatus::Completed;
        fast.start_time = Some(start);
        fast.end_time = Some(start + chrono::Duration::milliseconds(100));
        let mut slow = fast.clone();
        slow.end_time = Some(start + chrono::Duration::milliseconds(300));
        let mut failed = fast.clone();
        failed.status = JobStatus::Failed;
        failed.end_time = Some(start + chrono::Duration::seconds(60));

        let m = compute_metrics(&[fast, slow, failed], ["a"]);
        assert_eq!(m.average_duration_ms, 200.0);
        assert_eq!(m.workflows["a"].average_duration_ms, 200.0);
    }

    #[test]
    fn test_health() {
        let healthy = assess_health(&HealthInputs {
            initialized: true,
            registered_workflows: 3,
            output_dir_accessible: true,
            ..Default::default()
        });
        assert_eq!(healthy.status, HealthStatus::Healthy);
        assert_eq!(healthy.checks.len(), 3);

        let degraded = assess_health(&HealthInputs {
            initialized: true,
            registered_workflows: 0,
            output_dir_accessible: true,
            ..Default::default()
        });
        assert_eq!(degraded.status, HealthStatus::Degraded);
        assert!(!degraded.checks["workflows_registered"]);
        assert_eq!(
            serde_json::to_value(degraded.status).unwrap(),
            serde_json::json!("degraded")
        );
    }
}
