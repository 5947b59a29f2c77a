use std::path::PathBuf;
use suite_core::{FailureKind, JobId};

/// Why `PipelineOrchestrator::start` refused a request.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("generation {running} is already running")]
    AlreadyRunning { running: JobId },
    #[error("invalid generation request: {message}")]
    InvalidRequest { message: String },
    #[error("failed to start job thread: {source}")]
    ThreadSpawn {
        #[source]
        source: std::io::Error,
    },
}

/// Terminal failure of one job. Never escapes the orchestrator; it ends up
/// in the job snapshot and as one notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineFailure {
    #[error("build failed: {message}")]
    Build { message: String },
    #[error("engine timed out after {timeout_secs}s")]
    EngineTimeout { timeout_secs: u64 },
    #[error("engine exited with code {}: {reason}", .exit_code.map(|code| code.to_string()).unwrap_or_else(|| "none".to_string()))]
    EngineExit {
        exit_code: Option<i32>,
        reason: String,
    },
    #[error("engine rejected the target: {reason}")]
    EngineRejected { reason: String },
    #[error("{message}")]
    JavaVersion { message: String },
    #[error("invalid engine request: {message}")]
    InvalidEngineRequest { message: String },
    #[error("failed to start {what}: {message}")]
    Spawn { what: String, message: String },
    #[error("no result at {} after {waited_ms}ms", .path.display())]
    ResultTimeout { path: PathBuf, waited_ms: u64 },
    #[error("result at {} could not be parsed: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

impl PipelineFailure {
    pub fn code(&self) -> FailureKind {
        match self {
            PipelineFailure::Build { .. } => FailureKind::BuildFailure,
            PipelineFailure::EngineTimeout { .. } => FailureKind::EngineTimeout,
            PipelineFailure::EngineExit { .. } => FailureKind::EngineNonZeroExit,
            PipelineFailure::EngineRejected { .. } => FailureKind::EngineRejected,
            PipelineFailure::JavaVersion { .. } => FailureKind::IncorrectJavaVersion,
            PipelineFailure::InvalidEngineRequest { .. } => FailureKind::InvalidRequest,
            PipelineFailure::Spawn { .. } => FailureKind::SpawnFailure,
            PipelineFailure::ResultTimeout { .. } => FailureKind::ResultTimeout,
            PipelineFailure::Parse { .. } => FailureKind::ParseFailure,
        }
    }
}
