//! Scripted command runner for unit tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::runner::{CommandOutput, CommandRunner, CommandSpec, RunFailure};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Ok(String),
    Fail { message: String, output: String },
}

impl Reply {
    pub(crate) fn ok(output: &str) -> Self {
        Reply::Ok(output.to_string())
    }

    pub(crate) fn fail(message: &str, output: &str) -> Self {
        Reply::Fail {
            message: message.to_string(),
            output: output.to_string(),
        }
    }
}

/// Replies are keyed by program. Queued replies are consumed first, then the
/// program's fallback reply repeats.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    fallback: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<CommandSpec>>,
    delay: Duration,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn push(self, program: &str, reply: Reply) -> Self {
        self.queued
            .lock()
            .entry(program.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub(crate) fn always(self, program: &str, reply: Reply) -> Self {
        self.fallback.lock().insert(program.to_string(), reply);
        self
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunFailure> {
        self.calls.lock().push(spec.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let queued = self
            .queued
            .lock()
            .get_mut(&spec.program)
            .and_then(VecDeque::pop_front);
        let reply = queued.or_else(|| self.fallback.lock().get(&spec.program).cloned());

        match reply {
            Some(Reply::Ok(output)) => Ok(CommandOutput::new(output)),
            Some(Reply::Fail { message, output }) => {
                Err(RunFailure::new(message).with_output(output))
            }
            None => Err(RunFailure::new(format!("no script for '{}'", spec.program))),
        }
    }
}
