//! Workflow engine — the facade tying registry, store, executor, autopilot
//! and scheduler together.
//!
//! `Engine` is cheap to clone; clones share the same state. Start operations
//! return a job id immediately and run the work on a detached Tokio task.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use conductor_config::EngineSection;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use crate::artifacts::LogArtifacts;
use crate::autopilot::{AUTOPILOT_WORKFLOW_ID, Autopilot, AutopilotConfig, AutopilotSettings};
use crate::definition::{WorkflowDefinition, WorkflowOverride};
use crate::error::{EngineError, Result};
use crate::executor::{ExecutionSettings, Executor};
use crate::job::{Job, JobStatus, JobUpdate};
use crate::metrics::{HealthInputs, HealthReport, MetricsSnapshot, assess_health, compute_metrics};
use crate::registry::WorkflowRegistry;
use crate::runner::{CommandRunner, ProcessRunner};
use crate::schedule::{ScheduleInfo, Scheduler, TickOutcome};
use crate::store::JobStore;

/// Configuration for the workflow engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory for per-job log files.
    pub output_dir: PathBuf,

    /// Timeout applied when neither the override nor the definition sets one.
    pub default_timeout: Duration,

    /// Per-stream capture limit for child processes.
    pub max_output_bytes: usize,

    /// Length of the output excerpt kept on job records, in characters.
    pub excerpt_chars: usize,

    /// Pause between autopilot rounds.
    pub round_delay: Duration,

    /// Pause between retry attempts.
    pub retry_delay: Duration,

    /// Register the built-in workflows on initialization.
    pub seed_builtin_workflows: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("workflow-logs"),
            default_timeout: Duration::from_secs(300),
            max_output_bytes: 10 * 1024 * 1024,
            excerpt_chars: 1000,
            round_delay: Duration::from_secs(5),
            retry_delay: Duration::from_secs(1),
            seed_builtin_workflows: true,
        }
    }
}

impl From<&EngineSection> for EngineConfig {
    fn from(section: &EngineSection) -> Self {
        Self {
            output_dir: section.output_dir.clone(),
            default_timeout: Duration::from_secs(section.default_timeout_secs),
            max_output_bytes: section.max_output_bytes,
            excerpt_chars: section.excerpt_chars,
            round_delay: Duration::from_millis(section.round_delay_ms),
            retry_delay: Duration::from_millis(section.retry_delay_ms),
            seed_builtin_workflows: section.seed_builtin_workflows,
        }
    }
}

struct EngineInner {
    config: EngineConfig,
    registry: Arc<WorkflowRegistry>,
    store: Arc<JobStore>,
    artifacts: Arc<LogArtifacts>,
    executor: Executor,
    autopilot: Arc<Autopilot>,
    scheduler: Scheduler,
    initialized: AtomicBool,
    shut_down: AtomicBool,
}

/// The workflow orchestration engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine that runs real child processes.
    pub fn new(config: EngineConfig) -> Self {
        let runner = Arc::new(ProcessRunner::new(config.max_output_bytes));
        Self::with_runner(config, runner)
    }

    /// Create an engine over a custom command runner.
    pub fn with_runner(config: EngineConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let registry = Arc::new(WorkflowRegistry::new());
        let store = Arc::new(JobStore::new());
        let artifacts = Arc::new(LogArtifacts::new(&config.output_dir));

        let executor = Executor::new(
            Arc::clone(&store),
            Arc::clone(&artifacts),
            Arc::clone(&runner),
            ExecutionSettings {
                default_timeout: config.default_timeout,
                excerpt_chars: config.excerpt_chars,
                retry_delay: config.retry_delay,
            },
        );
        let autopilot = Arc::new(Autopilot::new(
            Arc::clone(&store),
            Arc::clone(&artifacts),
            Arc::clone(&registry),
            runner,
            AutopilotSettings {
                round_delay: config.round_delay,
                default_timeout: config.default_timeout,
                excerpt_chars: config.excerpt_chars,
            },
        ));

        Self {
            inner: Arc::new(EngineInner {
                config,
                registry,
                store,
                artifacts,
                executor,
                autopilot,
                scheduler: Scheduler::new(),
                initialized: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Prepare the output directory and seed the built-in workflows.
    ///
    /// Safe to call more than once.
    pub fn initialize(&self) -> Result<()> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(EngineError::ShutDown);
        }
        self.inner.artifacts.ensure_dir()?;
        if self.inner.config.seed_builtin_workflows {
            self.inner.registry.seed_builtins();
        }
        if !self.inner.initialized.swap(true, Ordering::SeqCst) {
            info!(
                output_dir = %self.inner.artifacts.dir().display(),
                workflows = self.inner.registry.len(),
                "Workflow engine initialized"
            );
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Register (or replace) a workflow definition.
    pub fn register_workflow(&self, definition: WorkflowDefinition) {
        self.inner.registry.register(definition);
    }

    /// Start a workflow and return its job id without waiting for it.
    pub fn start_workflow(
        &self,
        workflow_id: &str,
        overrides: Option<WorkflowOverride>,
    ) -> Result<String> {
        self.ensure_accepting()?;
        let definition = self
            .inner
            .registry
            .get(workflow_id)
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;
        let runtime = current_runtime()?;

        let metadata = overrides
            .as_ref()
            .map(WorkflowOverride::to_metadata)
            .unwrap_or_default();
        let job_id = self.inner.store.create(workflow_id, metadata);

        let executor = self.inner.executor.clone();
        let id = job_id.clone();
        self.spawn_job(&runtime, job_id.clone(), async move {
            executor.run_job(&id, &definition, overrides.as_ref()).await;
        });

        Ok(job_id)
    }

    /// Start an autopilot run and return its job id.
    pub fn start_autopilot(&self, config: AutopilotConfig) -> Result<String> {
        self.ensure_accepting()?;
        let runtime = current_runtime()?;

        let job_id = self
            .inner
            .store
            .create(AUTOPILOT_WORKFLOW_ID, config.to_metadata());

        let autopilot = Arc::clone(&self.inner.autopilot);
        let id = job_id.clone();
        self.spawn_job(&runtime, job_id.clone(), async move {
            autopilot.run(&id, &config).await;
        });

        Ok(job_id)
    }

    /// Logically stop a running job. The underlying process keeps running.
    pub fn stop_workflow(&self, job_id: &str) -> Result<()> {
        self.inner.store.stop(job_id)?;
        info!(job_id = %job_id, "Job stopped");
        Ok(())
    }

    pub fn get_workflow_status(&self, job_id: &str) -> Option<Job> {
        self.inner.store.get(job_id)
    }

    /// Registered workflow definitions, in registration order.
    pub fn list_workflows(&self) -> Vec<WorkflowDefinition> {
        self.inner.registry.list()
    }

    /// Every job, in creation order.
    pub fn list_jobs(&self) -> Vec<Job> {
        self.inner.store.list_all()
    }

    /// Run `workflow_id` on a fixed interval. Returns the schedule id.
    pub fn schedule_workflow(
        &self,
        workflow_id: &str,
        expression: &str,
        overrides: Option<WorkflowOverride>,
    ) -> Result<String> {
        self.ensure_accepting()?;
        if !self.inner.registry.contains(workflow_id) {
            return Err(EngineError::WorkflowNotFound(workflow_id.to_string()));
        }

        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let target = workflow_id.to_string();
        self.inner
            .scheduler
            .schedule(workflow_id, expression, move || {
                let Some(inner) = weak.upgrade() else {
                    return TickOutcome::Stop;
                };
                match (Engine { inner }).start_workflow(&target, overrides.clone()) {
                    Ok(job_id) => {
                        info!(workflow_id = %target, job_id = %job_id, "Scheduled run started");
                        TickOutcome::Continue
                    }
                    Err(EngineError::ShutDown) => TickOutcome::Stop,
                    Err(e) => {
                        warn!(workflow_id = %target, error = %e, "Scheduled run failed to start");
                        TickOutcome::Continue
                    }
                }
            })
    }

    pub fn cancel_schedule(&self, schedule_id: &str) -> Result<()> {
        self.inner.scheduler.cancel(schedule_id)
    }

    pub fn list_schedules(&self) -> Vec<ScheduleInfo> {
        self.inner.scheduler.list()
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        let jobs = self.inner.store.list_all();
        let ids = self.inner.registry.ids();
        compute_metrics(&jobs, ids.iter().map(String::as_str))
    }

    pub fn get_health_status(&self) -> HealthReport {
        let jobs = self.inner.store.list_all();
        assess_health(&HealthInputs {
            initialized: self.is_initialized(),
            registered_workflows: self.inner.registry.len(),
            output_dir_accessible: self.inner.artifacts.is_accessible(),
            active_jobs: jobs
                .iter()
                .filter(|j| j.status == JobStatus::Running)
                .count(),
            total_jobs: jobs.len(),
            active_schedules: self.inner.scheduler.len(),
        })
    }

    /// Cancel all schedules and refuse new work. Jobs already running are
    /// left to finish on their own. Returns the number of cancelled schedules.
    pub fn shutdown(&self) -> usize {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        let cancelled = self.inner.scheduler.shutdown();
        info!(cancelled_schedules = cancelled, "Workflow engine shut down");
        cancelled
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(EngineError::ShutDown);
        }
        if !self.is_initialized() {
            return Err(EngineError::NotInitialized);
        }
        Ok(())
    }

    /// Run `work` detached. A panic inside it still ends the job as Failed.
    fn spawn_job<F>(&self, runtime: &Handle, job_id: String, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let store = Arc::clone(&self.inner.store);
        let task = runtime.spawn(work);
        runtime.spawn(async move {
            if let Err(e) = task.await {
                error!(job_id = %job_id, error = %e, "Job task aborted");
                let update = JobUpdate {
                    status: Some(JobStatus::Failed),
                    end_time: Some(Utc::now()),
                    error: Some(format!("Job task aborted: {e}")),
                    ..Default::default()
                };
                let _ = store.apply_update(&job_id, update);
            }
        });
    }
}

fn current_runtime() -> Result<Handle> {
    Handle::try_current()
        .map_err(|_| EngineError::ExecutionFailed("no async runtime available".into()))
}
