use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use suite_core::{FileId, JobId, NotificationConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTopic {
    JobRejected,
    BuildFailed,
    EngineFailed,
    ResultTimeout,
    ResultParseFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub at: DateTime<Utc>,
    pub topic: NotificationTopic,
    pub severity: NotificationSeverity,
    pub title: String,
    pub body: String,
    pub job_id: Option<JobId>,
    pub file_id: Option<FileId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSinkKind {
    Stdout,
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPolicy {
    pub enabled_sinks: Vec<NotificationSinkKind>,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            enabled_sinks: vec![NotificationSinkKind::Stdout],
        }
    }
}

impl From<&NotificationConfig> for NotificationPolicy {
    fn from(config: &NotificationConfig) -> Self {
        let mut enabled_sinks = Vec::new();
        if config.stdout {
            enabled_sinks.push(NotificationSinkKind::Stdout);
        }
        if config.log {
            enabled_sinks.push(NotificationSinkKind::Log);
        }
        Self { enabled_sinks }
    }
}
