//! On-disk record of pipeline events.
//!
//! Every event of every generation job is appended to `global.jsonl` under
//! the configured root. Each job also gets `jobs/<job_id>.jsonl`, so a single
//! generation can be replayed from cache check to delivery or failure.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use suite_core::{JobId, PipelineEvent};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize event: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to append to log file {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read log file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// JSON lines event log of generation jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonlEventLog {
    pub root: PathBuf,
    pub global_file: PathBuf,
    pub job_dir: PathBuf,
}

impl JsonlEventLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            global_file: root.join("global.jsonl"),
            job_dir: root.join("jobs"),
            root,
        }
    }

    pub fn ensure_layout(&self) -> Result<(), EventLogError> {
        for dir in [&self.root, &self.job_dir] {
            fs::create_dir_all(dir).map_err(|source| EventLogError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Appends `event` to the global log and to its job's log.
    pub fn record(&self, event: &PipelineEvent) -> Result<(), EventLogError> {
        self.ensure_layout()?;
        let line = encode(event)?;
        append_line(&self.global_file, &line)?;
        append_line(&self.job_log_path(&event.job_id), &line)
    }

    pub fn job_log_path(&self, job_id: &JobId) -> PathBuf {
        self.job_dir.join(format!("{}.jsonl", job_id.as_str()))
    }

    pub fn global_log_path(&self) -> &Path {
        self.global_file.as_path()
    }

    /// Events of one job in the order they were recorded. A job that never
    /// logged anything has no events; lines that no longer decode are
    /// skipped.
    pub fn job_events(&self, job_id: &JobId) -> Result<Vec<PipelineEvent>, EventLogError> {
        let path = self.job_log_path(job_id);
        let body = match fs::read_to_string(&path) {
            Ok(body) => body,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(EventLogError::Read { path, source }),
        };

        let mut events = Vec::new();
        for (index, line) in body.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(event) => events.push(event),
                Err(err) => {
                    warn!(path = %path.display(), line = index + 1, error = %err, "skipping undecodable event");
                }
            }
        }
        Ok(events)
    }
}

fn encode(event: &PipelineEvent) -> Result<String, EventLogError> {
    let mut line =
        serde_json::to_string(event).map_err(|source| EventLogError::Serialize { source })?;
    line.push('\n');
    Ok(line)
}

fn append_line(path: &Path, line: &str) -> Result<(), EventLogError> {
    let append_error = |source| EventLogError::Append {
        path: path.to_path_buf(),
        source,
    };
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(append_error)?
        .write_all(line.as_bytes())
        .map_err(append_error)
}
