//! Identifiers and job descriptors shared by every pipeline stage.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static JOB_NONCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh id in the `test_gen_result_*` scheme. The id doubles as the
    /// result file name, so it only contains `[0-9a-z_]`.
    pub fn generate() -> Self {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let nonce = JOB_NONCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("test_gen_result_{nanos:x}_{nonce}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifies a source file (editor url or path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FileId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// What the engine is asked to target. Exactly one mode per job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TargetScope {
    Class,
    Method { descriptor: String },
    Line { line: u32 },
}

impl TargetScope {
    /// `class` for class and line scopes, `class#descriptor` for methods.
    pub fn target_unit(&self, class_fqn: &str) -> String {
        match self {
            TargetScope::Class | TargetScope::Line { .. } => class_fqn.to_string(),
            TargetScope::Method { descriptor } => format!("{class_fqn}#{descriptor}"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetScope::Class => "class",
            TargetScope::Method { .. } => "method",
            TargetScope::Line { .. } => "line",
        }
    }
}

/// Inclusive, 1-based line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub from: u32,
    pub to: u32,
}

impl LineRange {
    pub fn new(from: u32, to: u32) -> Self {
        Self { from, to }
    }

    pub fn single(line: u32) -> Self {
        Self {
            from: line,
            to: line,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    pub fn contains(&self, line: u32) -> bool {
        self.from <= line && line <= self.to
    }
}

impl std::fmt::Display for LineRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

/// One pending or delivered generation outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub file_id: FileId,
    pub target_unit: String,
    pub source_version: i64,
    pub job_id: JobId,
    pub classpath: String,
}

impl JobDescriptor {
    pub fn new(
        file_id: FileId,
        target_unit: impl Into<String>,
        source_version: i64,
        job_id: JobId,
        classpath: impl Into<String>,
    ) -> Self {
        Self {
            file_id,
            target_unit: target_unit.into(),
            source_version,
            job_id,
            classpath: classpath.into(),
        }
    }
}
