//! At most one generation job at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use suite_core::JobId;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FlightState {
    #[default]
    Idle,
    Running(JobId),
}

#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    state: Arc<Mutex<FlightState>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FlightState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the flight for `job_id`, or returns the job already running.
    pub fn try_acquire(&self, job_id: &JobId) -> Result<FlightPermit, JobId> {
        let mut state = self.lock();
        if let FlightState::Running(running) = &*state {
            return Err(running.clone());
        }
        *state = FlightState::Running(job_id.clone());
        Ok(FlightPermit {
            state: Arc::clone(&self.state),
            job_id: job_id.clone(),
        })
    }

    pub fn current(&self) -> Option<JobId> {
        match &*self.lock() {
            FlightState::Idle => None,
            FlightState::Running(job_id) => Some(job_id.clone()),
        }
    }

    pub fn is_idle(&self) -> bool {
        *self.lock() == FlightState::Idle
    }
}

/// Returns the flight to idle on drop.
#[derive(Debug)]
pub struct FlightPermit {
    state: Arc<Mutex<FlightState>>,
    job_id: JobId,
}

impl FlightPermit {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == FlightState::Running(self.job_id.clone()) {
            *state = FlightState::Idle;
        }
    }
}
