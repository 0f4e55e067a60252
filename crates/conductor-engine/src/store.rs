//! In-memory job store.
//!
//! The store is the single source of truth for job state. Every mutation goes
//! through [`JobStore::apply_update`] (or [`JobStore::stop`]), each of which
//! holds the write lock for the whole read-modify-write, so concurrent
//! updates to the same job never interleave.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::job::{Job, JobStatus, JobUpdate, Metadata};

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<String, Job>,
    /// Job ids in creation order.
    order: Vec<String>,
}

/// Map of job id → job record.
#[derive(Default)]
pub struct JobStore {
    inner: RwLock<StoreInner>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new pending job and return its id.
    pub fn create(&self, workflow_id: &str, metadata: Metadata) -> String {
        let job = Job::new(workflow_id, metadata);
        let id = job.id.clone();

        let mut inner = self.inner.write();
        inner.order.push(id.clone());
        inner.jobs.insert(id.clone(), job);

        debug!(job_id = %id, workflow_id = %workflow_id, "Job created");
        id
    }

    /// Merge a partial update into an existing job and return the result.
    pub fn apply_update(&self, job_id: &str, update: JobUpdate) -> Result<Job> {
        let mut inner = self.inner.write();
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;

        let requested = update.status;
        if !job.apply(update) {
            warn!(
                job_id = %job_id,
                current = %job.status,
                requested = ?requested,
                "Ignoring status change out of terminal state"
            );
        }
        Ok(job.clone())
    }

    /// Logically stop a running job.
    ///
    /// Only the record changes; the underlying process is not signalled.
    pub fn stop(&self, job_id: &str) -> Result<Job> {
        let mut inner = self.inner.write();
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;

        if job.status != JobStatus::Running {
            return Err(EngineError::InvalidState {
                job_id: job_id.to_string(),
                status: job.status.to_string(),
            });
        }

        job.apply(JobUpdate::stopped());
        Ok(job.clone())
    }

    /// Snapshot of a single job.
    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.inner.read().jobs.get(job_id).cloned()
    }

    /// Snapshot of every job, in creation order.
    pub fn list_all(&self) -> Vec<Job> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect()
    }

    /// Current status of a job.
    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.inner.read().jobs.get(job_id).map(|j| j.status)
    }

    pub fn len(&self) -> usize {
        self.inner.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_create_and_get() {
        let store = JobStore::new();
        let id = store.create("quality-gates", Metadata::new());
        let job = store.get(&id).unwrap();
        assert_eq!(job.workflow_id, "quality-gates");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(store.len(), 1);
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_list_all_in_creation_order() {
        let store = JobStore::new();
        let ids: Vec<String> = (0..5)
            .map(|i| store.create(&format!("wf-{i}"), Metadata::new()))
            .collect();
        let listed: Vec<String> = store.list_all().into_iter().map(|j| j.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn test_apply_update_unknown_job() {
        let store = JobStore::new();
        let err = store.apply_update("nope", JobUpdate::running()).unwrap_err();
        assert!(matches!(err, EngineError::JobNotFound(id) if id == "nope"));
    }

    #[test]
    fn test_stop_requires_running() {
        let store = JobStore::new();
        let id = store.create("wf", Metadata::new());

        let err = store.stop(&id).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { ref status, .. } if status == "pending"));

        store.apply_update(&id, JobUpdate::running()).unwrap();
        let stopped = store.stop(&id).unwrap();
        assert_eq!(stopped.status, JobStatus::Stopped);
        assert!(stopped.end_time.is_some());

        let err = store.stop(&id).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
        assert!(matches!(
            store.stop("missing").unwrap_err(),
            EngineError::JobNotFound(_)
        ));
    }

    #[test]
    fn test_stop_completed_leaves_job_unchanged() {
        let store = JobStore::new();
        let id = store.create("wf", Metadata::new());
        store.apply_update(&id, JobUpdate::running()).unwrap();
        store.apply_update(&id, JobUpdate::completed("OK")).unwrap();
        let before = store.get(&id).unwrap();

        assert!(store.stop(&id).is_err());
        assert_eq!(store.get(&id).unwrap(), before);
    }

    #[test]
    fn test_concurrent_updates_do_not_lose_fields() {
        let store = Arc::new(JobStore::new());
        let id = store.create("autopilot", Metadata::new());
        store.apply_update(&id, JobUpdate::running()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    for n in 0..50 {
                        store
                            .apply_update(
                                &id,
                                JobUpdate::default().with_metadata(format!("k{i}"), n),
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let job = store.get(&id).unwrap();
        assert_eq!(job.metadata.len(), 8);
        for i in 0..8 {
            assert_eq!(job.metadata[&format!("k{i}")], serde_json::json!(49));
        }
        assert_eq!(job.status, JobStatus::Running);
    }
}
