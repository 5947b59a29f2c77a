//! Validation for generator configuration.

use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

impl Validate for GeneratorConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.build.timeout_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "build.timeout.zero",
                message: "build timeout cannot be 0".to_string(),
            });
        }

        if self.engine.timeout_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "engine.timeout.zero",
                message: "engine timeout cannot be 0".to_string(),
            });
        }

        if self.engine.java_path.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "engine.java_path.empty",
                message: "java_path is empty, the engine cannot be launched".to_string(),
            });
        }

        if self.engine.jar_path.as_os_str().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "engine.jar_path.empty",
                message: "jar_path is empty, the engine cannot be launched".to_string(),
            });
        }

        if self.build.poll_interval_ms == 0 || self.engine.poll_interval_ms == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "subprocess.poll_interval.zero",
                message: "subprocess poll interval cannot be 0".to_string(),
            });
        }

        if self.watcher.poll_interval_ms == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "watcher.poll_interval.zero",
                message: "watcher poll interval cannot be 0".to_string(),
            });
        } else if self.watcher.poll_interval_ms > self.watcher.max_watch_ms {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "watcher.poll_interval.exceeds_window",
                message: format!(
                    "watcher polls every {}ms but gives up after {}ms, the result file is checked only once",
                    self.watcher.poll_interval_ms, self.watcher.max_watch_ms
                ),
            });
        }

        if self.engine.criteria.none_enabled() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "engine.criteria.empty",
                message: "no coverage criteria enabled, falling back to LINE".to_string(),
            });
        }

        issues
    }
}
