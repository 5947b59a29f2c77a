//! Pipeline job state transitions.

use chrono::{DateTime, Utc};
use suite_core::PipelineState;

#[derive(Debug, thiserror::Error)]
pub enum StateMachineError {
    #[error("invalid pipeline state transition: {from} -> {to}")]
    InvalidTransition {
        from: PipelineState,
        to: PipelineState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: PipelineState,
    pub to: PipelineState,
    pub at: DateTime<Utc>,
}

/// Moves `state` to `to` if the transition is allowed.
pub fn transition(
    state: &mut PipelineState,
    to: PipelineState,
    at: DateTime<Utc>,
) -> Result<StateTransition, StateMachineError> {
    let from = *state;
    if !is_transition_allowed(from, to) {
        return Err(StateMachineError::InvalidTransition { from, to });
    }

    *state = to;
    Ok(StateTransition { from, to, at })
}

/// Check if a state transition is valid.
///
/// ```text
/// Created → CacheCheck → Delivered
///               ↓
///           Building → Engine → ResultPending → Delivered | Errored
/// ```
///
/// Cancelled is reachable only before ResultPending. Terminal states never
/// move again.
pub fn is_transition_allowed(from: PipelineState, to: PipelineState) -> bool {
    use PipelineState::*;

    match (from, to) {
        (Created, CacheCheck) => true,
        // Cache hit
        (CacheCheck, Delivered) => true,
        (CacheCheck, Building) => true,
        (Building, Engine) => true,
        (Building, Errored) => true,
        (Engine, ResultPending) => true,
        (Engine, Errored) => true,
        (ResultPending, Delivered) => true,
        (ResultPending, Errored) => true,
        (Created | CacheCheck | Building | Engine, Cancelled) => true,
        _ => false,
    }
}
