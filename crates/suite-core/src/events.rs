use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::state::PipelineState;
use crate::types::{FileId, JobId};

static EVENT_NONCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn generate(job_id: &JobId) -> Self {
        let nonce = EVENT_NONCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("E-{job_id}-{nonce}"))
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EventId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fatal or surfaced failure categories of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    BuildFailure,
    EngineTimeout,
    EngineNonZeroExit,
    /// The engine ran but could not load or initialize the target class.
    EngineRejected,
    IncorrectJavaVersion,
    /// The engine refused the request before starting.
    InvalidRequest,
    SpawnFailure,
    ResultTimeout,
    ParseFailure,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::BuildFailure => "build_failure",
            FailureKind::EngineTimeout => "engine_timeout",
            FailureKind::EngineNonZeroExit => "engine_non_zero_exit",
            FailureKind::EngineRejected => "engine_rejected",
            FailureKind::IncorrectJavaVersion => "incorrect_java_version",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::SpawnFailure => "spawn_failure",
            FailureKind::ResultTimeout => "result_timeout",
            FailureKind::ParseFailure => "parse_failure",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventKind {
    JobRejected {
        running: JobId,
    },
    StateChanged {
        from: PipelineState,
        to: PipelineState,
    },
    CacheInvalidated {
        lines: Vec<u32>,
    },
    CacheHit {
        tests: usize,
    },
    BuildFinished {
        success: bool,
        exit_code: Option<i32>,
    },
    EngineStarted {
        command: String,
    },
    EngineProgress {
        fraction: f64,
    },
    EngineExited {
        exit_code: Option<i32>,
    },
    ResultWatchStarted {
        path: String,
    },
    ResultDelivered {
        tests: usize,
        from_cache: bool,
    },
    ResultDropped,
    Cancelled,
    Failed {
        kind: FailureKind,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub id: EventId,
    pub job_id: JobId,
    pub file_id: Option<FileId>,
    pub at: DateTime<Utc>,
    pub kind: PipelineEventKind,
}

impl PipelineEvent {
    pub fn new(job_id: JobId, file_id: Option<FileId>, kind: PipelineEventKind) -> Self {
        Self {
            id: EventId::generate(&job_id),
            job_id,
            file_id,
            at: Utc::now(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EventId, FailureKind, PipelineEvent, PipelineEventKind};
    use crate::state::PipelineState;
    use crate::types::{FileId, JobId};
    use chrono::{TimeZone, Utc};

    #[test]
    fn event_kind_serializes_with_snake_case_variant_names() {
        let kind = PipelineEventKind::Failed {
            kind: FailureKind::EngineNonZeroExit,
            message: "exit 1".to_string(),
        };
        let encoded = serde_json::to_string(&kind).expect("serialize event kind");
        assert!(encoded.contains("\"failed\""));
        assert!(encoded.contains("\"engine_non_zero_exit\""));

        let decoded: PipelineEventKind =
            serde_json::from_str(&encoded).expect("deserialize event kind");
        assert_eq!(decoded, kind);
    }

    #[test]
    fn event_roundtrip_preserves_identifiers_timestamp_and_payload() {
        let event = PipelineEvent {
            id: EventId("E1".to_string()),
            job_id: JobId::new("J1"),
            file_id: Some(FileId::new("Pizza.java")),
            at: Utc
                .with_ymd_and_hms(2026, 2, 8, 12, 30, 45)
                .single()
                .expect("valid timestamp"),
            kind: PipelineEventKind::StateChanged {
                from: PipelineState::Building,
                to: PipelineState::Engine,
            },
        };
        let encoded = serde_json::to_string(&event).expect("serialize event");
        assert!(encoded.contains("\"BUILDING\""));
        let decoded: PipelineEvent = serde_json::from_str(&encoded).expect("deserialize event");
        assert_eq!(decoded, event);
    }

    #[test]
    fn generated_event_ids_are_distinct() {
        let job = JobId::new("J9");
        let a = PipelineEvent::new(job.clone(), None, PipelineEventKind::Cancelled);
        let b = PipelineEvent::new(job, None, PipelineEventKind::Cancelled);
        assert_ne!(a.id, b.id);
        assert!(a.id.as_ref().starts_with("E-J9-"));
    }

    #[test]
    fn failure_kind_display_matches_wire_name() {
        assert_eq!(FailureKind::ResultTimeout.to_string(), "result_timeout");
        assert_eq!(
            serde_json::to_string(&FailureKind::IncorrectJavaVersion).expect("serialize"),
            format!("\"{}\"", FailureKind::IncorrectJavaVersion)
        );
        assert_eq!(
            serde_json::to_string(&FailureKind::SpawnFailure).expect("serialize"),
            "\"spawn_failure\""
        );
    }
}
