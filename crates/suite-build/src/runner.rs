//! Build supervisor - runs the project's build command before generation.

use chrono::Utc;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use suite_core::{
    drain_remaining, kill_child, pipe_child_output, platform_shell, BuildConfig, CancelToken,
    OutputTail,
};
use tracing::{debug, info, warn};

use crate::error::BuildError;
use crate::types::{BuildOutcome, BuildResult};

const OUTPUT_TAIL_LINES: usize = 40;
const OUTPUT_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSupervisor {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for BuildSupervisor {
    fn default() -> Self {
        Self::from_config(&BuildConfig::default())
    }
}

impl BuildSupervisor {
    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            timeout: config.timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Runs `command` through the platform shell in `project_root`.
    ///
    /// Never retries. Exceeding the timeout or observing cancellation kills
    /// the process.
    pub fn run(
        &self,
        project_root: &Path,
        command: &str,
        cancel: &CancelToken,
    ) -> Result<BuildResult, BuildError> {
        let started_at = Utc::now();

        if command.trim().is_empty() {
            debug!("no build command configured, skipping build");
            return Ok(BuildResult {
                command: "(no build command configured)".to_string(),
                outcome: BuildOutcome::Succeeded,
                exit_code: Some(0),
                started_at,
                finished_at: Utc::now(),
                output_tail: Vec::new(),
            });
        }
        if self.timeout.is_zero() {
            return Err(BuildError::InvalidRequest {
                message: "timeout must be greater than zero".to_string(),
            });
        }

        let (shell, flag) = platform_shell();
        let rendered = format!("{shell} {flag} {command}");
        let deadline = Instant::now() + self.timeout;

        info!(command = %rendered, root = %project_root.display(), "starting build");
        let mut child = Command::new(shell)
            .arg(flag)
            .arg(command)
            .current_dir(project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BuildError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::channel::<String>();
        pipe_child_output(&mut child, tx);

        let mut tail = OutputTail::new(OUTPUT_TAIL_LINES);
        let mut forced: Option<BuildOutcome> = None;
        let mut exit_code = None;
        let mut exited_ok = false;

        loop {
            while let Ok(line) = rx.try_recv() {
                tail.push(line);
            }

            if cancel.is_cancelled() {
                forced = Some(BuildOutcome::Cancelled);
                kill_child(&mut child);
                break;
            }

            if Instant::now() >= deadline {
                warn!(command = %rendered, timeout_secs = self.timeout.as_secs(), "build timed out");
                forced = Some(BuildOutcome::TimedOut);
                kill_child(&mut child);
                break;
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    exit_code = status.code();
                    exited_ok = status.success();
                    break;
                }
                Ok(None) => {}
                Err(source) => {
                    kill_child(&mut child);
                    return Err(BuildError::Wait {
                        command: rendered,
                        source,
                    });
                }
            }

            thread::sleep(self.poll_interval);
        }

        drain_remaining(&rx, OUTPUT_GRACE, |line| tail.push(line));

        let outcome = forced.unwrap_or(if exited_ok {
            BuildOutcome::Succeeded
        } else {
            BuildOutcome::Failed { exit_code }
        });
        info!(command = %rendered, ?outcome, "build finished");

        Ok(BuildResult {
            command: rendered,
            outcome,
            exit_code,
            started_at,
            finished_at: Utc::now(),
            output_tail: tail.into_vec(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::BuildSupervisor;
    use crate::error::BuildError;
    use crate::types::BuildOutcome;
    use std::path::Path;
    use std::thread;
    use std::time::{Duration, Instant};
    use suite_core::CancelToken;

    fn supervisor(timeout: Duration) -> BuildSupervisor {
        BuildSupervisor {
            timeout,
            poll_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn build_succeeds_with_true() {
        let result = supervisor(Duration::from_secs(10))
            .run(Path::new("/tmp"), "true", &CancelToken::new())
            .expect("run build");
        assert!(result.success());
        assert_eq!(result.exit_code, Some(0));
    }

    #[test]
    fn build_fails_with_exit_code() {
        let result = supervisor(Duration::from_secs(10))
            .run(Path::new("/tmp"), "echo broken >&2; exit 3", &CancelToken::new())
            .expect("run build");
        assert_eq!(result.outcome, BuildOutcome::Failed { exit_code: Some(3) });
        assert_eq!(result.output_tail, vec!["broken".to_string()]);
    }

    #[test]
    fn build_runs_in_project_root() {
        let dir = std::env::temp_dir();
        let result = supervisor(Duration::from_secs(10))
            .run(&dir, "pwd", &CancelToken::new())
            .expect("run build");
        assert!(result.success());
        let reported = result.output_tail.last().cloned().unwrap_or_default();
        let expected = dir.canonicalize().expect("canonical temp dir");
        assert_eq!(
            Path::new(&reported).canonicalize().expect("canonical pwd"),
            expected
        );
    }

    #[test]
    fn empty_command_passes_without_spawning() {
        let result = supervisor(Duration::from_secs(10))
            .run(Path::new("/nonexistent/dir"), "  ", &CancelToken::new())
            .expect("run build");
        assert!(result.success());
    }

    #[test]
    fn slow_build_is_killed_on_timeout() {
        let started = Instant::now();
        let result = supervisor(Duration::from_millis(200))
            .run(Path::new("/tmp"), "sleep 30", &CancelToken::new())
            .expect("run build");
        assert_eq!(result.outcome, BuildOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn cancellation_kills_the_build() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });

        let result = supervisor(Duration::from_secs(30))
            .run(Path::new("/tmp"), "sleep 30", &cancel)
            .expect("run build");
        handle.join().expect("cancel thread");
        assert_eq!(result.outcome, BuildOutcome::Cancelled);
    }

    #[test]
    fn missing_working_directory_is_a_spawn_error() {
        let err = supervisor(Duration::from_secs(10))
            .run(Path::new("/definitely/not/here"), "true", &CancelToken::new())
            .expect_err("spawn should fail");
        assert!(matches!(err, BuildError::Spawn { .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = supervisor(Duration::ZERO)
            .run(Path::new("/tmp"), "true", &CancelToken::new())
            .expect_err("zero timeout");
        assert!(matches!(err, BuildError::InvalidRequest { .. }));
    }
}
