//! Polls for the engine's serialized result file.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use suite_core::{GenerationReport, JobId, WatcherConfig};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    Found {
        path: PathBuf,
        report: GenerationReport,
    },
    TimedOut {
        path: PathBuf,
        waited: Duration,
    },
    /// The file appeared but could not be read or parsed.
    Unreadable { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultWatcher {
    pub results_dir: PathBuf,
    pub poll_interval: Duration,
    pub max_watch: Duration,
}

impl Default for ResultWatcher {
    fn default() -> Self {
        Self::from_config(&WatcherConfig::default())
    }
}

impl ResultWatcher {
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self {
            results_dir: config.resolved_results_dir(),
            poll_interval: config.poll_interval(),
            max_watch: config.max_watch(),
        }
    }

    pub fn result_path(&self, job_id: &JobId) -> PathBuf {
        self.results_dir.join(job_id.as_str())
    }

    pub fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.results_dir)
    }

    /// Blocks until the result for `job_id` shows up or the window closes.
    ///
    /// The window starts when this is called. The first check happens
    /// immediately, later ones every `poll_interval`.
    pub fn watch(&self, job_id: &JobId) -> WatchOutcome {
        let path = self.result_path(job_id);
        if let Err(err) = self.ensure_dir() {
            warn!(dir = %self.results_dir.display(), error = %err, "cannot create results directory");
        }

        let started = Instant::now();
        loop {
            if path.exists() {
                return read_report(path);
            }

            let waited = started.elapsed();
            if waited >= self.max_watch {
                debug!(job = %job_id, waited_ms = waited.as_millis() as u64, "result watch window closed");
                return WatchOutcome::TimedOut { path, waited };
            }
            let remaining = self.max_watch - waited;
            thread::sleep(self.poll_interval.min(remaining));
        }
    }
}

fn read_report(path: PathBuf) -> WatchOutcome {
    let body = match fs::read_to_string(&path) {
        Ok(body) => body,
        Err(err) => {
            return WatchOutcome::Unreadable {
                path,
                message: err.to_string(),
            }
        }
    };
    match GenerationReport::from_json_str(&body) {
        Ok(report) => WatchOutcome::Found { path, report },
        Err(err) => WatchOutcome::Unreadable {
            path,
            message: err.to_string(),
        },
    }
}
