//! Helpers shared by the subprocess supervisors.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::process::Child;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Forwards stdout and stderr of `child` line by line into `tx`.
///
/// Reader threads are detached; they end when the pipes close.
pub fn pipe_child_output(child: &mut Child, tx: mpsc::Sender<String>) {
    if let Some(stdout) = child.stdout.take() {
        let tx_out = tx.clone();
        thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines().map_while(Result::ok) {
                let _ = tx_out.send(line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        thread::spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(Result::ok) {
                let _ = tx.send(line);
            }
        });
    }
}

/// Drains lines still in flight after the child exited. Stops once every
/// reader hung up, or after `grace` without a new line.
pub fn drain_remaining(rx: &mpsc::Receiver<String>, grace: Duration, mut on_line: impl FnMut(String)) {
    while let Ok(line) = rx.recv_timeout(grace) {
        on_line(line);
    }
}

/// Kills the child and reaps it so no zombie is left behind.
pub fn kill_child(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Keeps the last `capacity` output lines.
#[derive(Debug, Clone)]
pub struct OutputTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn into_vec(self) -> Vec<String> {
        self.lines.into()
    }
}

/// Platform shell invocation: `sh -c` on unix, `cmd.exe /c` on windows.
pub fn platform_shell() -> (&'static str, &'static str) {
    if cfg!(windows) {
        ("cmd.exe", "/c")
    } else {
        ("sh", "-c")
    }
}
