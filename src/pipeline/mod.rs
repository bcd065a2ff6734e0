// src/pipeline/mod.rs

//! The run pipeline: pre-build, patch, compile, launch, reconcile, clean up.
//!
//! [`Pipeline::execute`] returns the raw [`ReconciledOutcome`] or the first
//! stage error. [`Pipeline::run`] folds either into a [`RunReport`] holding a
//! [`Verdict`] for every requested test.

pub mod orchestrator;
pub mod report;

use std::collections::BTreeMap;

use crate::errors::{ErrorKind, PipelineError};
use crate::results::ReconciledOutcome;
use crate::types::{TestId, TestStatus};

pub use orchestrator::{describe_plan, Pipeline, RunPlan};
pub use report::{print_report, write_report};

/// Final state of one requested test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed { message: Option<String> },
    Skipped,
    /// Requested but absent from the results artifact.
    Ignored,
    /// The pipeline failed before this test could be classified.
    Errored { message: String },
}

impl Verdict {
    /// Status shown to users. Ignored tests are shown as skipped; errored
    /// tests have no test status.
    pub fn reported_status(&self) -> Option<TestStatus> {
        match self {
            Verdict::Passed => Some(TestStatus::Passed),
            Verdict::Failed { .. } => Some(TestStatus::Failed),
            Verdict::Skipped | Verdict::Ignored => Some(TestStatus::Skipped),
            Verdict::Errored { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Verdict::Failed { .. } | Verdict::Errored { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub id: TestId,
    /// Fully qualified type path the test was focused by.
    pub type_path: String,
    pub verdict: Verdict,
}

/// Outcome of one run, one entry per requested test in id order.
#[derive(Debug)]
pub struct RunReport {
    pub entries: Vec<ReportEntry>,
    pub error: Option<PipelineError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerdictCounts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub ignored: usize,
    pub errored: usize,
}

impl RunReport {
    pub fn from_outcome(outcome: &ReconciledOutcome, type_paths: BTreeMap<TestId, String>) -> Self {
        let mut verdicts: BTreeMap<TestId, Verdict> = BTreeMap::new();
        for r in &outcome.passed {
            verdicts.insert(r.id.clone(), Verdict::Passed);
        }
        for r in &outcome.failed {
            verdicts.insert(
                r.id.clone(),
                Verdict::Failed {
                    message: r.message.clone(),
                },
            );
        }
        for r in &outcome.skipped {
            verdicts.insert(r.id.clone(), Verdict::Skipped);
        }
        for id in &outcome.ignored {
            verdicts.insert(id.clone(), Verdict::Ignored);
        }

        let entries = type_paths
            .into_iter()
            .map(|(id, type_path)| {
                let verdict = verdicts.remove(&id).unwrap_or(Verdict::Ignored);
                ReportEntry {
                    id,
                    type_path,
                    verdict,
                }
            })
            .collect();

        Self {
            entries,
            error: None,
        }
    }

    /// Every requested test gets `verdict`.
    pub fn from_error(
        error: PipelineError,
        verdict: Verdict,
        type_paths: BTreeMap<TestId, String>,
    ) -> Self {
        let entries = type_paths
            .into_iter()
            .map(|(id, type_path)| ReportEntry {
                id,
                type_path,
                verdict: verdict.clone(),
            })
            .collect();

        Self {
            entries,
            error: Some(error),
        }
    }

    pub fn verdict(&self, id: &TestId) -> Option<&Verdict> {
        self.entries.iter().find(|e| &e.id == id).map(|e| &e.verdict)
    }

    pub fn counts(&self) -> VerdictCounts {
        let mut c = VerdictCounts::default();
        for e in &self.entries {
            match e.verdict {
                Verdict::Passed => c.passed += 1,
                Verdict::Failed { .. } => c.failed += 1,
                Verdict::Skipped => c.skipped += 1,
                Verdict::Ignored => c.ignored += 1,
                Verdict::Errored { .. } => c.errored += 1,
            }
        }
        c
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(PipelineError::is_cancelled)
    }

    /// Process exit code for the binary.
    ///
    /// 0 all passed or skipped, 1 failures or a run error, 2 user or
    /// configuration error, 130 cancelled.
    pub fn exit_code(&self) -> i32 {
        match self.error.as_ref().map(PipelineError::kind) {
            Some(ErrorKind::Cancel) => 130,
            Some(ErrorKind::User) | Some(ErrorKind::Config) => 2,
            Some(ErrorKind::Run) => 1,
            None if self.entries.iter().any(|e| e.verdict.is_failure()) => 1,
            None => 0,
        }
    }
}
