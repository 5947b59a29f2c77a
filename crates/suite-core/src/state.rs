//! Pipeline job states.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    /// Request accepted, nothing done yet
    Created,
    /// Static invalidation and cache lookup
    CacheCheck,
    /// Project build running
    Building,
    /// Engine subprocess running
    Engine,
    /// Engine exited cleanly, waiting for the result file
    ResultPending,
    Delivered,
    Errored,
    Cancelled,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            PipelineState::Created => "CREATED",
            PipelineState::CacheCheck => "CACHE_CHECK",
            PipelineState::Building => "BUILDING",
            PipelineState::Engine => "ENGINE",
            PipelineState::ResultPending => "RESULT_PENDING",
            PipelineState::Delivered => "DELIVERED",
            PipelineState::Errored => "ERRORED",
            PipelineState::Cancelled => "CANCELLED",
        };
        f.write_str(tag)
    }
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Delivered | PipelineState::Errored | PipelineState::Cancelled
        )
    }

    /// Cancellation is honoured until the engine has exited.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            PipelineState::Created
                | PipelineState::CacheCheck
                | PipelineState::Building
                | PipelineState::Engine
        )
    }

    /// True while a subprocess may be alive for this job.
    pub fn runs_subprocess(&self) -> bool {
        matches!(self, PipelineState::Building | PipelineState::Engine)
    }
}
