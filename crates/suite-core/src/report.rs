//! Wire format of the engine's serialized result and the in-memory test case.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(default)]
    pub test_name: String,
    pub test_code: String,
    #[serde(default)]
    pub covered_lines: BTreeSet<u32>,
    #[serde(default)]
    pub covered_branches: Vec<serde_json::Value>,
    #[serde(default)]
    pub covered_mutants: Vec<serde_json::Value>,
}

impl TestCase {
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        covered_lines: impl IntoIterator<Item = u32>,
    ) -> Self {
        Self {
            test_name: name.into(),
            test_code: code.into(),
            covered_lines: covered_lines.into_iter().collect(),
            covered_branches: Vec::new(),
            covered_mutants: Vec::new(),
        }
    }
}

/// Result of one generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    #[serde(rename = "UUT", default)]
    pub uut: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_suite_code: Option<String>,
    #[serde(default)]
    pub test_case_list: BTreeMap<String, TestCase>,
    #[serde(default)]
    pub all_covered_lines: BTreeSet<u32>,
    #[serde(default)]
    pub all_uncovered_lines: BTreeSet<u32>,
    #[serde(default)]
    pub all_covered_branches: Vec<serde_json::Value>,
    #[serde(default)]
    pub all_uncovered_branches: Vec<serde_json::Value>,
    #[serde(default)]
    pub all_covered_mutation: Vec<serde_json::Value>,
    #[serde(default)]
    pub all_uncovered_mutation: Vec<serde_json::Value>,
}

impl GenerationReport {
    /// Parses a result file body. Test cases missing a name take their map key.
    pub fn from_json_str(body: &str) -> Result<Self, serde_json::Error> {
        let report: GenerationReport = serde_json::from_str(body)?;
        Ok(report.normalized())
    }

    /// Report synthesized from cached test cases; only line coverage survives.
    pub fn from_test_cases(uut: impl Into<String>, tests: Vec<TestCase>) -> Self {
        let mut report = GenerationReport {
            uut: uut.into(),
            ..GenerationReport::default()
        };
        for test in tests {
            report
                .all_covered_lines
                .extend(test.covered_lines.iter().copied());
            report.test_case_list.insert(test.test_name.clone(), test);
        }
        report
    }

    pub fn normalized(mut self) -> Self {
        for (name, test) in self.test_case_list.iter_mut() {
            if test.test_name.is_empty() {
                test.test_name = name.clone();
            }
        }
        self
    }

    pub fn test_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.test_case_list.values()
    }

    pub fn len(&self) -> usize {
        self.test_case_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.test_case_list.is_empty()
    }

    /// `package ...;` line of the generated suite, if any.
    pub fn package_line(&self) -> Option<String> {
        self.test_suite_code.as_deref().and_then(|code| {
            code.lines()
                .map(str::trim)
                .find(|line| line.starts_with("package "))
                .map(str::to_string)
        })
    }

    /// Import lines of the generated suite minus engine runtime imports and
    /// the class under test itself.
    pub fn import_lines(&self, class_fqn: &str) -> Vec<String> {
        let Some(code) = self.test_suite_code.as_deref() else {
            return Vec::new();
        };
        let mut seen = BTreeSet::new();
        code.lines()
            .map(str::trim)
            .filter(|line| line.starts_with("import "))
            .filter(|line| {
                !line.contains("evosuite") && !line.contains("RunWith") && !line.contains(class_fqn)
            })
            .filter(|line| seen.insert(line.to_string()))
            .map(str::to_string)
            .collect()
    }
}
