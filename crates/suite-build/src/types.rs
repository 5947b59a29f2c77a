use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum BuildOutcome {
    Succeeded,
    Failed { exit_code: Option<i32> },
    TimedOut,
    Cancelled,
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Succeeded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub command: String,
    pub outcome: BuildOutcome,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Last lines of combined stdout/stderr.
    pub output_tail: Vec<String>,
}

impl BuildResult {
    pub fn success(&self) -> bool {
        self.outcome.is_success()
    }

    /// One-line reason suitable for a notification body.
    pub fn summary(&self) -> String {
        let reason = match self.outcome {
            BuildOutcome::Succeeded => return format!("build succeeded: {}", self.command),
            BuildOutcome::Failed {
                exit_code: Some(code),
            } => format!("build exited with code {code}"),
            BuildOutcome::Failed { exit_code: None } => "build was terminated by a signal".to_string(),
            BuildOutcome::TimedOut => "build timed out".to_string(),
            BuildOutcome::Cancelled => "build cancelled".to_string(),
        };
        match self.output_tail.last() {
            Some(line) => format!("{reason}: {line}"),
            None => reason,
        }
    }
}
