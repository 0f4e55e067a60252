//! Shared helpers for engine integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use conductor_engine::{
    CommandOutput, CommandRunner, CommandSpec, Engine, EngineConfig, Job, RunFailure,
};

type Handler = dyn Fn(&CommandSpec, usize) -> Result<CommandOutput, RunFailure> + Send + Sync;

/// Runner whose behaviour is a closure over the spec and the call index.
pub struct FnRunner {
    handler: Box<Handler>,
    calls: AtomicUsize,
    delay: Duration,
}

impl FnRunner {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&CommandSpec, usize) -> Result<CommandOutput, RunFailure> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        })
    }

    /// Every call sleeps for `delay`, then succeeds with `output`.
    pub fn slow(delay: Duration, output: &'static str) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(move |_, _| Ok(CommandOutput::new(output))),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    /// Every call succeeds with `output`.
    pub fn always_ok(output: &'static str) -> Arc<Self> {
        Self::new(move |_, _| Ok(CommandOutput::new(output)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for FnRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.handler)(spec, n)
    }
}

/// Engine config writing logs under `dir` with short delays.
pub fn test_config(dir: &Path) -> EngineConfig {
    EngineConfig {
        output_dir: dir.join("workflow-logs"),
        round_delay: Duration::from_millis(10),
        retry_delay: Duration::from_millis(10),
        ..Default::default()
    }
}

/// Initialized engine over `runner`.
pub fn test_engine(dir: &Path, runner: Arc<dyn CommandRunner>) -> Engine {
    let engine = Engine::with_runner(test_config(dir), runner);
    engine.initialize().expect("engine init failed");
    engine
}

/// Poll until the job reaches a terminal state.
pub async fn wait_for_terminal(engine: &Engine, job_id: &str) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        let job = engine
            .get_workflow_status(job_id)
            .expect("job should exist");
        if job.status.is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} did not finish (status {})",
            job.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
