use crate::error::NotifyError;
use crate::types::{
    NotificationMessage, NotificationPolicy, NotificationSeverity, NotificationSinkKind,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tracing::{error, info, warn};

const DEFAULT_FAILED_QUEUE_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDelivery {
    pub sink_kind: NotificationSinkKind,
    pub payload: String,
    pub error: String,
    pub failed_at: String,
}

/// Bounded queue of deliveries that failed; the oldest entry goes first.
#[derive(Debug, Clone)]
pub struct FailedDeliveryQueue {
    entries: Vec<FailedDelivery>,
    max_size: usize,
}

impl FailedDeliveryQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_size,
        }
    }

    pub fn push(&mut self, entry: FailedDelivery) {
        if self.max_size == 0 {
            return;
        }

        if self.entries.len() >= self.max_size {
            self.entries.remove(0);
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[FailedDelivery] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FailedDeliveryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_FAILED_QUEUE_SIZE)
    }
}

pub trait NotificationSink: Send + Sync {
    fn kind(&self) -> NotificationSinkKind;
    fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError>;
}

fn render_line(message: &NotificationMessage) -> String {
    format!(
        "[{:?}] {:?} {} | job={} | {}",
        message.severity,
        message.topic,
        message.title,
        message
            .job_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string()),
        message.body
    )
}

#[derive(Debug, Clone, Default)]
pub struct StdoutSink;

impl NotificationSink for StdoutSink {
    fn kind(&self) -> NotificationSinkKind {
        NotificationSinkKind::Stdout
    }

    fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", render_line(message)).map_err(|err| NotifyError::SinkFailed {
            message: err.to_string(),
        })
    }
}

/// Forwards notifications into the tracing subscriber at matching level.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn kind(&self) -> NotificationSinkKind {
        NotificationSinkKind::Log
    }

    fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError> {
        let job = message.job_id.as_ref().map(|id| id.to_string());
        match message.severity {
            NotificationSeverity::Info => {
                info!(topic = ?message.topic, job = ?job, body = %message.body, "{}", message.title)
            }
            NotificationSeverity::Warning => {
                warn!(topic = ?message.topic, job = ?job, body = %message.body, "{}", message.title)
            }
            NotificationSeverity::Error => {
                error!(topic = ?message.topic, job = ?job, body = %message.body, "{}", message.title)
            }
        }
        Ok(())
    }
}

pub struct NotificationDispatcher {
    sinks: Vec<Box<dyn NotificationSink>>,
    failed: Mutex<FailedDeliveryQueue>,
}

impl NotificationDispatcher {
    pub fn new(sinks: Vec<Box<dyn NotificationSink>>) -> Self {
        Self {
            sinks,
            failed: Mutex::new(FailedDeliveryQueue::default()),
        }
    }

    pub fn with_failed_queue_size(sinks: Vec<Box<dyn NotificationSink>>, max_size: usize) -> Self {
        Self {
            sinks,
            failed: Mutex::new(FailedDeliveryQueue::new(max_size)),
        }
    }

    pub fn from_policy(policy: &NotificationPolicy) -> Self {
        let sinks = policy
            .enabled_sinks
            .iter()
            .map(|kind| -> Box<dyn NotificationSink> {
                match kind {
                    NotificationSinkKind::Stdout => Box::new(StdoutSink),
                    NotificationSinkKind::Log => Box::new(LogSink),
                }
            })
            .collect();
        Self::new(sinks)
    }

    pub fn sink_kinds(&self) -> Vec<NotificationSinkKind> {
        self.sinks.iter().map(|sink| sink.kind()).collect()
    }

    pub fn failed_notifications(&self) -> Vec<FailedDelivery> {
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries()
            .to_vec()
    }

    pub fn clear_failed_notifications(&self) {
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Sends `message` to every sink. A failing sink never blocks the others.
    pub fn dispatch(
        &self,
        message: &NotificationMessage,
    ) -> Vec<(NotificationSinkKind, Result<(), NotifyError>)> {
        let mut out = Vec::new();
        for sink in &self.sinks {
            let result = sink.send(message);
            if let Err(err) = &result {
                let payload = serde_json::to_string(message)
                    .unwrap_or_else(|serialize_err| format!("{{\"error\":\"{serialize_err}\"}}"));
                self.failed
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(FailedDelivery {
                        sink_kind: sink.kind(),
                        payload,
                        error: err.to_string(),
                        failed_at: Utc::now().to_rfc3339(),
                    });
            }
            out.push((sink.kind(), result));
        }
        out
    }
}
