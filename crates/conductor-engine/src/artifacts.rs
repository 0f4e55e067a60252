//! Per-job log files.

use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// Writes full captured output to `<output_dir>/<job_id>.log`.
#[derive(Debug, Clone)]
pub struct LogArtifacts {
    dir: PathBuf,
}

impl LogArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the output directory if missing.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            EngineError::InitFailed(format!(
                "cannot create output directory {}: {}",
                self.dir.display(),
                e
            ))
        })
    }

    /// Whether the output directory exists and is a directory.
    pub fn is_accessible(&self) -> bool {
        std::fs::metadata(&self.dir)
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    pub fn path_for(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{job_id}.log"))
    }

    /// Write (or replace) the log for a job.
    pub async fn write(&self, job_id: &str, content: &str) -> std::io::Result<PathBuf> {
        let path = self.path_for(job_id);
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }
}
