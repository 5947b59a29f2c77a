use chrono::Utc;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use suite_core::{
    drain_remaining, kill_child, pipe_child_output, CancelToken, EngineConfig, OutputTail,
};
use tracing::{debug, info, warn};

use crate::adapter::EngineAdapter;
use crate::diagnostics::OutputDiagnostics;
use crate::error::EngineError;
use crate::progress::ProgressParser;
use crate::types::{EngineRequest, EngineRunResult, EngineStopReason, ProgressUpdate};

const OUTPUT_TAIL_LINES: usize = 40;
const OUTPUT_GRACE: Duration = Duration::from_millis(200);

/// Supervises one engine subprocess: timeout, cancellation, progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSupervisor {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for EngineSupervisor {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl EngineSupervisor {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            timeout: config.timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Runs the engine until it exits, times out or `cancel` fires.
    ///
    /// `on_progress` sees every line that carries a progress bar.
    pub fn run(
        &self,
        request: &EngineRequest,
        adapter: &dyn EngineAdapter,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(ProgressUpdate),
    ) -> Result<EngineRunResult, EngineError> {
        if self.timeout.is_zero() {
            return Err(EngineError::InvalidRequest {
                message: "timeout must be greater than zero".to_string(),
            });
        }
        if request.class_fqn.trim().is_empty() {
            return Err(EngineError::InvalidRequest {
                message: "class_fqn must not be empty".to_string(),
            });
        }

        let parser = ProgressParser::new()?;
        let mut diagnostics = OutputDiagnostics::new()?;
        let command = adapter.build_command(request);
        let rendered = command.render();
        let started_at = Utc::now();
        let deadline = Instant::now() + self.timeout;

        info!(job = %request.job_id, adapter = adapter.name(), command = %rendered, "starting engine");
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(key, value)| (key, value)))
            .current_dir(&request.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::channel::<String>();
        pipe_child_output(&mut child, tx);

        let mut tail = OutputTail::new(OUTPUT_TAIL_LINES);
        let mut last_progress: Option<ProgressUpdate> = None;
        let mut handle_line = |line: String, tail: &mut OutputTail| {
            if let Some(reading) = parser.parse(&line) {
                let update = ProgressUpdate {
                    fraction: reading.fraction(),
                    stage: reading.stage(),
                    reading,
                };
                debug!(job = %request.job_id, fraction = update.fraction, "engine progress");
                on_progress(update);
                last_progress = Some(update);
            }
            diagnostics.observe(&line);
            tail.push(line);
        };

        let mut stop_reason: Option<EngineStopReason> = None;
        let mut exit_code = None;

        loop {
            while let Ok(line) = rx.try_recv() {
                handle_line(line, &mut tail);
            }

            if cancel.is_cancelled() {
                info!(job = %request.job_id, "engine cancelled, killing subprocess");
                stop_reason = Some(EngineStopReason::Cancelled);
                kill_child(&mut child);
                break;
            }

            if Instant::now() >= deadline {
                warn!(job = %request.job_id, timeout_secs = self.timeout.as_secs(), "engine timed out");
                stop_reason = Some(EngineStopReason::Timeout);
                kill_child(&mut child);
                break;
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    exit_code = status.code();
                    if status.success() {
                        stop_reason = Some(EngineStopReason::Completed);
                    }
                    break;
                }
                Ok(None) => {}
                Err(source) => {
                    kill_child(&mut child);
                    return Err(EngineError::Runtime {
                        command: rendered,
                        source,
                    });
                }
            }

            thread::sleep(self.poll_interval);
        }

        drain_remaining(&rx, OUTPUT_GRACE, |line| handle_line(line, &mut tail));

        let (stop_reason, failure_reason) = match stop_reason {
            Some(EngineStopReason::Completed) => match diagnostics.rejection() {
                Some(rejection) => (EngineStopReason::Rejected, Some(rejection.to_string())),
                None => (EngineStopReason::Completed, None),
            },
            Some(reason) => (reason, None),
            None => (EngineStopReason::Failed, Some(diagnostics.exit_reason())),
        };
        info!(job = %request.job_id, ?stop_reason, ?exit_code, reason = ?failure_reason, "engine finished");

        Ok(EngineRunResult {
            job_id: request.job_id.clone(),
            command: rendered,
            started_at,
            finished_at: Utc::now(),
            stop_reason,
            exit_code,
            last_progress,
            output_tail: tail.into_vec(),
            failure_reason,
        })
    }
}
