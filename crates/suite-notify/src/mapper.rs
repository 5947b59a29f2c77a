//! Map pipeline events to notifications.

use chrono::Utc;
use suite_core::{FailureKind, PipelineEvent, PipelineEventKind};

use crate::types::{NotificationMessage, NotificationSeverity, NotificationTopic};

/// At most one notification per event. Cancellation and success stay quiet.
pub fn notification_for_event(event: &PipelineEvent) -> Option<NotificationMessage> {
    let (topic, severity, title, body) = match &event.kind {
        PipelineEventKind::JobRejected { running } => (
            NotificationTopic::JobRejected,
            NotificationSeverity::Warning,
            "Generation already running".to_string(),
            format!("Another generation ({running}) is still running. Wait for it to finish."),
        ),
        PipelineEventKind::Failed { kind, message } => {
            let (topic, severity, title) = match kind {
                FailureKind::BuildFailure => (
                    NotificationTopic::BuildFailed,
                    NotificationSeverity::Error,
                    "Project build failed",
                ),
                FailureKind::EngineTimeout => (
                    NotificationTopic::EngineFailed,
                    NotificationSeverity::Error,
                    "Test generation timed out",
                ),
                FailureKind::EngineNonZeroExit => (
                    NotificationTopic::EngineFailed,
                    NotificationSeverity::Error,
                    "Test generation failed",
                ),
                FailureKind::EngineRejected => (
                    NotificationTopic::EngineFailed,
                    NotificationSeverity::Error,
                    "Target class could not be loaded",
                ),
                FailureKind::IncorrectJavaVersion => (
                    NotificationTopic::EngineFailed,
                    NotificationSeverity::Error,
                    "Incorrect Java version",
                ),
                FailureKind::InvalidRequest => (
                    NotificationTopic::EngineFailed,
                    NotificationSeverity::Error,
                    "Invalid generation request",
                ),
                FailureKind::SpawnFailure => (
                    NotificationTopic::EngineFailed,
                    NotificationSeverity::Error,
                    "Could not start subprocess",
                ),
                FailureKind::ResultTimeout => (
                    NotificationTopic::ResultTimeout,
                    NotificationSeverity::Warning,
                    "No generation result found",
                ),
                FailureKind::ParseFailure => (
                    NotificationTopic::ResultParseFailed,
                    NotificationSeverity::Error,
                    "Generation result could not be read",
                ),
            };
            (topic, severity, title.to_string(), message.clone())
        }
        _ => return None,
    };

    Some(NotificationMessage {
        at: Utc::now(),
        topic,
        severity,
        title,
        body,
        job_id: Some(event.job_id.clone()),
        file_id: event.file_id.clone(),
    })
}
