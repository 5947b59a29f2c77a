//! Progress lines printed by the engine on stdout.
//!
//! Two bars share a line, `[Progress:====>     42%] [Cov:==>        17%]`:
//! the search budget and the achieved coverage. The job advances with
//! whichever is further.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

const SEARCH_PATTERN: &str = r"Progress:[>= ]*(\d+(?:\.\d+)?)%";
const COVERAGE_PATTERN: &str = r"Cov:[>= ]*(\d+(?:\.\d+)?)%";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStage {
    Searching,
    PostProcessing,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressReading {
    pub search: Option<f64>,
    pub coverage: Option<f64>,
}

impl ProgressReading {
    /// Larger of the two bars, clamped to `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        let value = match (self.search, self.coverage) {
            (Some(search), Some(coverage)) => search.max(coverage),
            (Some(search), None) => search,
            (None, Some(coverage)) => coverage,
            (None, None) => 0.0,
        };
        value.clamp(0.0, 1.0)
    }

    pub fn stage(&self) -> EngineStage {
        if self.fraction() >= 1.0 {
            EngineStage::PostProcessing
        } else {
            EngineStage::Searching
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressParser {
    search: Regex,
    coverage: Regex,
}

impl ProgressParser {
    pub fn new() -> Result<Self, EngineError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|source| EngineError::Pattern {
                pattern: pattern.to_string(),
                source,
            })
        };
        Ok(Self {
            search: compile(SEARCH_PATTERN)?,
            coverage: compile(COVERAGE_PATTERN)?,
        })
    }

    /// `None` when the line carries neither bar.
    pub fn parse(&self, line: &str) -> Option<ProgressReading> {
        let search = capture_percent(&self.search, line);
        let coverage = capture_percent(&self.coverage, line);
        if search.is_none() && coverage.is_none() {
            return None;
        }
        Some(ProgressReading { search, coverage })
    }
}

fn capture_percent(pattern: &Regex, line: &str) -> Option<f64> {
    let captures = pattern.captures(line)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    Some(value / 100.0)
}
