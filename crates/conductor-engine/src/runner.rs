//! Command execution seam.
//!
//! The executor and autopilot never spawn processes directly; they go through
//! [`CommandRunner`]. [`ProcessRunner`] is the real implementation, backed by
//! `tokio::process`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Grace period for output readers once the child has been killed.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// A fully resolved command invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment entries layered over the inherited environment.
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandSpec {
    /// `program arg1 arg2 …`, for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output of a command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// Standard output followed by standard error.
    pub fn combined(&self) -> String {
        combine_streams(&self.stdout, &self.stderr)
    }
}

/// A failed run: spawn error, non-zero exit, or timeout.
///
/// `output` carries whatever was captured before the failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct RunFailure {
    pub message: String,
    pub output: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl RunFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            output: String::new(),
            exit_code: None,
            timed_out: false,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }
}

/// Runs a resolved command and captures its output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. Only a zero exit status is `Ok`.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunFailure>;
}

/// Spawns real child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    /// Per-stream capture limit in bytes.
    max_output_bytes: usize,
}

impl ProcessRunner {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(10 * 1024 * 1024)
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunFailure> {
        let started = Instant::now();
        let deadline = started + spec.timeout;

        let mut command = tokio::process::Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            RunFailure::new(format!("Failed to spawn '{}': {}", spec.program, e))
        })?;

        let stdout = StreamCapture::start(child.stdout.take(), self.max_output_bytes);
        let stderr = StreamCapture::start(child.stderr.take(), self.max_output_bytes);

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                let output = drain(stdout, stderr, Instant::now() + DRAIN_GRACE).await;
                return Err(RunFailure::new(format!("Process error: {}", e)).with_output(output));
            }
            Err(_) => {
                let _ = child.kill().await;
                let output = drain(stdout, stderr, Instant::now() + DRAIN_GRACE).await;
                tracing::debug!(command = %spec.display(), "command timed out");
                return Err(RunFailure {
                    message: format!(
                        "Command '{}' timed out after {}s",
                        spec.display(),
                        spec.timeout.as_secs_f64()
                    ),
                    output,
                    exit_code: None,
                    timed_out: true,
                });
            }
        };

        // Background grandchildren can hold the pipes open past exit.
        let grace = deadline.max(Instant::now() + DRAIN_GRACE);
        let (stdout, stderr) = drain_streams(stdout, stderr, grace).await;

        tracing::debug!(
            command = %spec.display(),
            exit_code = ?status.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "command finished"
        );

        if status.success() {
            return Ok(CommandOutput {
                stdout,
                stderr,
                exit_code: status.code(),
            });
        }

        let message = match status.code() {
            Some(code) => format!("Command '{}' exited with code {}", spec.display(), code),
            None => format!("Command '{}' was terminated by a signal", spec.display()),
        };
        Err(RunFailure {
            message,
            output: combine_streams(&stdout, &stderr),
            exit_code: status.code(),
            timed_out: false,
        })
    }
}

/// Bounded, shared capture buffer for one pipe.
///
/// The buffer lives outside the reader task so partial output survives an
/// aborted reader.
struct StreamCapture {
    buffer: Arc<Mutex<Captured>>,
    reader: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl StreamCapture {
    fn start<R>(pipe: Option<R>, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Captured::default()));
        let reader = pipe.map(|mut pipe| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => {
                            let mut captured = buffer.lock();
                            let room = limit.saturating_sub(captured.bytes.len());
                            let take = n.min(room);
                            captured.bytes.extend_from_slice(&chunk[..take]);
                            if take < n {
                                captured.truncated = true;
                            }
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "output pipe read failed");
                            break;
                        }
                    }
                }
            })
        });
        Self { buffer, reader }
    }

    async fn finish(mut self, deadline: Instant) -> String {
        if let Some(mut reader) = self.reader.take()
            && tokio::time::timeout_at(deadline, &mut reader).await.is_err()
        {
            reader.abort();
        }
        let captured = self.buffer.lock();
        let mut text = String::from_utf8_lossy(&captured.bytes).into_owned();
        if captured.truncated {
            text.push_str(&format!(
                "\n[output truncated at {} bytes]\n",
                captured.bytes.len()
            ));
        }
        text
    }
}

async fn drain_streams(
    stdout: StreamCapture,
    stderr: StreamCapture,
    deadline: Instant,
) -> (String, String) {
    tokio::join!(stdout.finish(deadline), stderr.finish(deadline))
}

async fn drain(stdout: StreamCapture, stderr: StreamCapture, deadline: Instant) -> String {
    let (stdout, stderr) = drain_streams(stdout, stderr, deadline).await;
    combine_streams(&stdout, &stderr)
}

fn combine_streams(stdout: &str, stderr: &str) -> String {
    if stderr.is_empty() {
        return stdout.to_string();
    }
    if stdout.is_empty() {
        return stderr.to_string();
    }
    let mut out = String::with_capacity(stdout.len() + stderr.len() + 1);
    out.push_str(stdout);
    if !stdout.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(stderr);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec {
            program: "/bin/sh".into(),
            args: vec!["-c".into(), script.into()],
            env: BTreeMap::new(),
            working_dir: None,
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(sh("echo OK").display(), "/bin/sh -c echo OK");
    }

    #[test]
    fn test_combine_streams() {
        assert_eq!(combine_streams("out\n", ""), "out\n");
        assert_eq!(combine_streams("", "err"), "err");
        assert_eq!(combine_streams("out", "err"), "out\nerr");
        assert_eq!(combine_streams("out\n", "err\n"), "out\nerr\n");
    }

    #[tokio::test]
    async fn test_success_captures_stdout() {
        let out = ProcessRunner::default().run(&sh("echo OK")).await.unwrap();
        assert_eq!(out.stdout, "OK\n");
        assert_eq!(out.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_stderr_follows_stdout() {
        let out = ProcessRunner::default()
            .run(&sh("echo first; echo second >&2"))
            .await
            .unwrap();
        assert_eq!(out.combined(), "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_keeps_output() {
        let err = ProcessRunner::default()
            .run(&sh("echo partial; echo broken >&2; exit 3"))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code, Some(3));
        assert!(!err.timed_out);
        assert!(err.message.contains("exited with code 3"));
        assert!(err.output.contains("partial"));
        assert!(err.output.contains("broken"));
    }

    #[tokio::test]
    async fn test_timeout_kills_and_keeps_partial_output() {
        let mut spec = sh("echo before; exec sleep 10");
        spec.timeout = Duration::from_millis(300);

        let started = std::time::Instant::now();
        let err = ProcessRunner::default().run(&spec).await.unwrap_err();
        assert!(err.timed_out);
        assert!(err.message.contains("timed out"));
        assert!(err.output.contains("before"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let spec = CommandSpec {
            program: "/definitely/not/a/binary".into(),
            args: vec![],
            env: BTreeMap::new(),
            working_dir: None,
            timeout: Duration::from_secs(1),
        };
        let err = ProcessRunner::default().run(&spec).await.unwrap_err();
        assert!(err.message.contains("Failed to spawn"));
        assert!(err.output.is_empty());
    }

    #[tokio::test]
    async fn test_env_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = sh("printf '%s:' \"$CONDUCTOR_TEST_VAR\"; pwd");
        spec.env.insert("CONDUCTOR_TEST_VAR".into(), "hello".into());
        spec.working_dir = Some(dir.path().to_path_buf());

        let out = ProcessRunner::default().run(&spec).await.unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        assert!(out.stdout.starts_with("hello:"));
        assert!(out.stdout.trim_end().ends_with(canonical.to_str().unwrap()));
    }

    #[tokio::test]
    async fn test_output_limit() {
        let out = ProcessRunner::new(16)
            .run(&sh("printf '%0100d' 0"))
            .await
            .unwrap();
        assert!(out.stdout.starts_with("0000000000000000\n[output truncated"));
    }
}
