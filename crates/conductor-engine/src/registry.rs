//! Workflow registry.
//!
//! Holds the set of known [`WorkflowDefinition`]s, keyed by id and listed in
//! registration order. Re-registering an id replaces the definition in place.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::definition::WorkflowDefinition;

/// Built-in compliance workflow id. Also used by the autopilot.
pub const COMPLIANCE_CHECK: &str = "compliance-check";
/// Built-in automation workflow id.
pub const AUTOMATION_MASTER: &str = "automation-master";
/// Built-in quality gates workflow id.
pub const QUALITY_GATES: &str = "quality-gates";

/// Definitions seeded on initialization.
pub fn builtin_workflows() -> Vec<WorkflowDefinition> {
    vec![
        WorkflowDefinition::new(COMPLIANCE_CHECK, "npm")
            .with_name("Compliance Check")
            .with_description("Run the project's compliance checks")
            .with_args(["run", "compliance:check"])
            .with_timeout_secs(300),
        WorkflowDefinition::new(AUTOMATION_MASTER, "node")
            .with_name("Automation Master")
            .with_description("Run the master automation script")
            .with_args(["scripts/automation-master.js"])
            .with_timeout_secs(600),
        WorkflowDefinition::new(QUALITY_GATES, "npm")
            .with_name("Quality Gates")
            .with_description("Run the quality gate suite")
            .with_args(["run", "quality:gates"])
            .with_timeout_secs(300),
    ]
}

#[derive(Default)]
struct RegistryInner {
    order: Vec<String>,
    definitions: HashMap<String, WorkflowDefinition>,
}

/// Thread-safe workflow registry.
#[derive(Default)]
pub struct WorkflowRegistry {
    inner: RwLock<RegistryInner>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Returns `true` if an existing one was replaced.
    pub fn register(&self, definition: WorkflowDefinition) -> bool {
        let mut inner = self.inner.write();
        let id = definition.id.clone();
        let replaced = inner.definitions.insert(id.clone(), definition).is_some();
        if !replaced {
            inner.order.push(id.clone());
        }
        debug!(workflow_id = %id, replaced, "Workflow registered");
        replaced
    }

    /// Register every built-in definition. Returns how many were registered.
    pub fn seed_builtins(&self) -> usize {
        let builtins = builtin_workflows();
        let count = builtins.len();
        for def in builtins {
            self.register(def);
        }
        count
    }

    pub fn get(&self, id: &str) -> Option<WorkflowDefinition> {
        self.inner.read().definitions.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().definitions.contains_key(id)
    }

    /// All definitions in registration order.
    pub fn list(&self) -> Vec<WorkflowDefinition> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.definitions.get(id).cloned())
            .collect()
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
