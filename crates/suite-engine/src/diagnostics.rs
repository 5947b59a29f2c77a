//! Failure reasons pulled out of engine output.
//!
//! The engine reports most problems on stdout and may still exit with 0
//! when the target class cannot be loaded, so every line is inspected.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

const ERROR_PATTERN: &str = r"Error: (.*)";
const EXCEPTION_PATTERN: &str = r"Exception: (.*)";
const UNKNOWN_CLASS_MARKER: &str = "Unknown class";
const TARGET_INIT_MARKER: &str = "Error while initializing target class";
const NON_ZERO_EXIT_FALLBACK: &str = "the engine exited with a non-zero code";

/// Output that means the engine never generated anything for the target,
/// whatever its exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetRejection {
    UnknownClass,
    TargetInitialization,
}

impl TargetRejection {
    pub fn message(&self) -> &'static str {
        match self {
            TargetRejection::UnknownClass => {
                "unknown class, make sure the project is built and the classpath is correct"
            }
            TargetRejection::TargetInitialization => "error while initializing target class",
        }
    }
}

impl std::fmt::Display for TargetRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone)]
pub struct OutputDiagnostics {
    error: Regex,
    exception: Regex,
    first_error: Option<String>,
    first_exception: Option<String>,
    rejection: Option<TargetRejection>,
}

impl OutputDiagnostics {
    pub fn new() -> Result<Self, EngineError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|source| EngineError::Pattern {
                pattern: pattern.to_string(),
                source,
            })
        };
        Ok(Self {
            error: compile(ERROR_PATTERN)?,
            exception: compile(EXCEPTION_PATTERN)?,
            first_error: None,
            first_exception: None,
            rejection: None,
        })
    }

    pub fn observe(&mut self, line: &str) {
        if self.first_error.is_none() {
            self.first_error = capture(&self.error, line);
        }
        if self.first_exception.is_none() {
            self.first_exception = capture(&self.exception, line);
        }
        if self.rejection.is_none() {
            if line.contains(UNKNOWN_CLASS_MARKER) {
                self.rejection = Some(TargetRejection::UnknownClass);
            } else if line.contains(TARGET_INIT_MARKER) {
                self.rejection = Some(TargetRejection::TargetInitialization);
            }
        }
    }

    pub fn rejection(&self) -> Option<TargetRejection> {
        self.rejection
    }

    /// First `Error:` message, else first `Exception:` message, else a
    /// generic line.
    pub fn exit_reason(&self) -> String {
        self.first_error
            .clone()
            .or_else(|| self.first_exception.clone())
            .unwrap_or_else(|| NON_ZERO_EXIT_FALLBACK.to_string())
    }
}

fn capture(pattern: &Regex, line: &str) -> Option<String> {
    let message = pattern.captures(line)?.get(1)?.as_str().trim();
    if message.is_empty() {
        None
    } else {
        Some(message.to_string())
    }
}
