//! Jobs whose results have not been delivered yet.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use suite_core::{JobDescriptor, JobId};

/// Whole-table mutex; `take` is the only way a result can be claimed, so each
/// job is delivered at most once.
#[derive(Debug, Default)]
pub struct PendingJobTable {
    entries: Mutex<HashMap<JobId, JobDescriptor>>,
}

impl PendingJobTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobDescriptor>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `descriptor`, replacing any entry under the same job id.
    pub fn insert(&self, descriptor: JobDescriptor) {
        self.lock().insert(descriptor.job_id.clone(), descriptor);
    }

    /// Removes and returns the descriptor. A second call returns `None`.
    pub fn take(&self, job_id: &JobId) -> Option<JobDescriptor> {
        self.lock().remove(job_id)
    }

    /// Drops the entry for a cancelled or failed job.
    pub fn remove(&self, job_id: &JobId) -> bool {
        self.lock().remove(job_id).is_some()
    }

    pub fn get(&self, job_id: &JobId) -> Option<JobDescriptor> {
        self.lock().get(job_id).cloned()
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.lock().contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.lock().keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }
}
