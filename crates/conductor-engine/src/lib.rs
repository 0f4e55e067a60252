//! Workflow job orchestration engine for Conductor.
//!
//! This crate provides the `Engine` — a registry of named command workflows,
//! an in-memory job store with a lifecycle state machine, detached execution
//! of child processes with timeouts and retry, an autopilot loop that
//! re-runs compliance checks until they pass, and interval scheduling.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Engine                                                 │
//! │  - WorkflowRegistry (definitions, built-ins)            │
//! │  - JobStore (single writer path: apply_update)          │
//! │  - Executor / Autopilot (detached Tokio tasks)          │
//! │  - Scheduler ("every N minutes" timers)                 │
//! │  - Metrics + health snapshots                           │
//! └───────────────────────────┬─────────────────────────────┘
//!                             │ CommandRunner
//!                 ┌───────────┴───────────┐
//!                 │  ProcessRunner        │
//!                 │  (tokio::process)     │
//!                 └───────────────────────┘
//! ```

pub mod artifacts;
pub mod autopilot;
pub mod definition;
pub mod engine;
pub mod error;
pub mod executor;
pub mod job;
pub mod metrics;
pub mod registry;
pub mod runner;
pub mod schedule;
pub mod store;

#[cfg(test)]
mod testing;

pub use artifacts::LogArtifacts;
pub use autopilot::{ALL_CHECKS_PASSING, AUTOPILOT_WORKFLOW_ID, AutopilotConfig, is_passing};
pub use definition::{WorkflowDefinition, WorkflowOverride};
pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, ErrorKind, Result};
pub use job::{Job, JobStatus, JobUpdate, Metadata};
pub use metrics::{HealthReport, HealthStatus, MetricsSnapshot, WorkflowMetrics};
pub use registry::{AUTOMATION_MASTER, COMPLIANCE_CHECK, QUALITY_GATES, builtin_workflows};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner, RunFailure};
pub use schedule::{ScheduleInfo, parse_interval};
