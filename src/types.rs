// src/types.rs

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Type-path prefix shared by every unit test datum.
pub const UNIT_TEST_PREFIX: &str = "/datum/unit_test/";

/// Bare test identifier, e.g. `"spawn_humans"` for `/datum/unit_test/spawn_humans`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TestId(String);

impl TestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Recover a bare id from a fully qualified type path.
    ///
    /// Paths without the unit test prefix are kept as they are.
    pub fn from_type_path(path: &str) -> Self {
        let path = path.trim();
        Self(path.strip_prefix(UNIT_TEST_PREFIX).unwrap_or(path).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fully qualified type path, e.g. `/datum/unit_test/spawn_humans`.
    pub fn type_path(&self) -> String {
        format!("{UNIT_TEST_PREFIX}{}", self.0)
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestId {
    fn from(s: &str) -> Self {
        TestId::new(s)
    }
}

/// The tests a run was asked to execute. Fixed for the duration of a run.
pub type RequestedTestSet = BTreeSet<TestId>;

/// Status reported for a single test by a results artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

impl TryFrom<u8> for TestStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(TestStatus::Passed),
            1 => Ok(TestStatus::Failed),
            2 => Ok(TestStatus::Skipped),
            other => Err(format!("unknown test status code {other} (expected 0, 1 or 2)")),
        }
    }
}

/// One decoded result. Only the results layer creates these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub id: TestId,
    pub status: TestStatus,
    pub message: Option<String>,
}

impl TestResult {
    pub fn new(id: TestId, status: TestStatus, message: Option<String>) -> Self {
        Self {
            id,
            status,
            message: message.filter(|m| !m.trim().is_empty()),
        }
    }
}

/// Encoding of the results artifact written by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultsFormat {
    /// JSON object keyed by type path.
    Structured,
    /// Plain text log with `PASS:` / `FAIL:` lines.
    LineLog,
}

impl Default for ResultsFormat {
    fn default() -> Self {
        ResultsFormat::Structured
    }
}

impl ResultsFormat {
    /// Where the daemon writes this format, relative to the workspace root.
    pub fn default_path(self) -> &'static str {
        match self {
            ResultsFormat::Structured => "data/unit_tests.json",
            ResultsFormat::LineLog => "data/logs/ci/unit_tests.log",
        }
    }
}

impl FromStr for ResultsFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "structured" | "json" => Ok(ResultsFormat::Structured),
            "line-log" | "log" => Ok(ResultsFormat::LineLog),
            other => Err(format!(
                "invalid results format: {other} (expected \"structured\" or \"line-log\")"
            )),
        }
    }
}
