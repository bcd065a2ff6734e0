// src/results/mod.rs

//! Reading the results artifact the daemon leaves behind.
//!
//! Two encodings exist ([`ResultsFormat`]). Each has its own decoder that
//! produces the same canonical [`ResultSet`]; a single [`reconcile`] step
//! then classifies every requested test.

pub mod line_log;
pub mod reconcile;
pub mod structured;

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use crate::errors::{PipelineError, Result};
use crate::fs::FileSystem;
use crate::types::{RequestedTestSet, ResultsFormat, TestId, TestResult, TestStatus};

pub use line_log::parse_line_log;
pub use reconcile::{reconcile, Classification, ReconciledOutcome};
pub use structured::parse_structured;

/// Canonical decoded results, keyed by test id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    results: BTreeMap<TestId, TestResult>,
    display_names: BTreeMap<TestId, String>,
}

impl ResultSet {
    /// Record a result. A failure is never overwritten by a later pass or
    /// skip for the same test.
    pub fn record(&mut self, id: TestId, status: TestStatus, message: Option<String>) {
        if let Some(existing) = self.results.get(&id) {
            if existing.status == TestStatus::Failed && status != TestStatus::Failed {
                return;
            }
        }
        self.results
            .insert(id.clone(), TestResult::new(id, status, message));
    }

    pub fn set_display_name(&mut self, id: TestId, name: String) {
        self.display_names.insert(id, name);
    }

    pub fn get(&self, id: &TestId) -> Option<&TestResult> {
        self.results.get(id)
    }

    pub fn status_of(&self, id: &TestId) -> Option<TestStatus> {
        self.results.get(id).map(|r| r.status)
    }

    pub fn display_name(&self, id: &TestId) -> Option<&str> {
        self.display_names.get(id).map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = &TestId> {
        self.results.keys()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Decode artifact text with the decoder for `format`.
pub fn decode(format: ResultsFormat, text: &str) -> Result<ResultSet> {
    match format {
        ResultsFormat::Structured => parse_structured(text),
        ResultsFormat::LineLog => Ok(parse_line_log(text)),
    }
}

/// Read the artifact at `location` and classify every requested test.
///
/// A missing artifact is a `ConfigError`: it usually means the results
/// format or path is configured wrong, which is different from "no tests
/// ran" (an existing but empty artifact).
pub fn read_results(
    fs: &dyn FileSystem,
    location: &Path,
    format: ResultsFormat,
    requested: &RequestedTestSet,
) -> Result<ReconciledOutcome> {
    if !fs.is_file(location) {
        return Err(PipelineError::ConfigError(format!(
            "results artifact {} was not produced; check results.format and results.path",
            location.display()
        )));
    }

    let text = fs.read_to_string(location).map_err(|e| {
        PipelineError::ConfigError(format!("reading results artifact: {e:#}"))
    })?;

    let results = decode(format, &text)?;
    let outcome = reconcile(&results, requested);

    info!(
        artifact = %location.display(),
        ?format,
        decoded = results.len(),
        passed = outcome.passed.len(),
        failed = outcome.failed.len(),
        skipped = outcome.skipped.len(),
        ignored = outcome.ignored.len(),
        "reconciled results"
    );
    Ok(outcome)
}
