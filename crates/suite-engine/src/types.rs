use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use suite_core::{JobId, TargetScope};

use crate::progress::{EngineStage, ProgressReading};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
}

impl EngineCommand {
    /// Shell-quoted rendering for logs and events.
    pub fn render(&self) -> String {
        let mut rendered = shell_quote(&self.program);
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&shell_quote(arg));
        }
        rendered
    }
}

fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "-_=./:#()".contains(ch))
    {
        return value.to_string();
    }
    let escaped = value.replace('\'', "'\"'\"'");
    format!("'{escaped}'")
}

/// One engine invocation for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineRequest {
    pub job_id: JobId,
    pub project_root: PathBuf,
    pub class_fqn: String,
    pub scope: TargetScope,
    pub classpath: String,
    /// Directory the engine serializes `<job-id>` into.
    pub results_dir: PathBuf,
}

impl EngineRequest {
    pub fn result_path(&self) -> PathBuf {
        self.results_dir.join(self.job_id.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStopReason {
    Completed,
    Failed,
    /// Exited cleanly but reported that the target class is unusable.
    Rejected,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub fraction: f64,
    pub stage: EngineStage,
    pub reading: ProgressReading,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRunResult {
    pub job_id: JobId,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stop_reason: EngineStopReason,
    pub exit_code: Option<i32>,
    pub last_progress: Option<ProgressUpdate>,
    pub output_tail: Vec<String>,
    /// Readable reason for `Failed` and `Rejected` runs.
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl EngineRunResult {
    /// Exit code 0 within the time bound and without cancellation.
    pub fn exited_cleanly(&self) -> bool {
        self.stop_reason == EngineStopReason::Completed
    }
}
