// src/results/reconcile.rs

use std::collections::BTreeSet;

use tracing::debug;

use crate::results::ResultSet;
use crate::types::{RequestedTestSet, TestId, TestResult, TestStatus};

/// Which bucket a requested test ended up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Passed,
    Failed,
    /// Reported as skipped by the artifact itself.
    Skipped,
    /// Requested but absent from the artifact.
    Ignored,
}

impl Classification {
    /// Status shown to callers. Ignored tests are reported as skipped.
    pub fn reported_status(self) -> TestStatus {
        match self {
            Classification::Passed => TestStatus::Passed,
            Classification::Failed => TestStatus::Failed,
            Classification::Skipped | Classification::Ignored => TestStatus::Skipped,
        }
    }
}

/// Partition of a requested test set into four disjoint buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciledOutcome {
    pub passed: Vec<TestResult>,
    pub failed: Vec<TestResult>,
    pub skipped: Vec<TestResult>,
    pub ignored: Vec<TestId>,
}

impl ReconciledOutcome {
    pub fn len(&self) -> usize {
        self.passed.len() + self.failed.len() + self.skipped.len() + self.ignored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn classification(&self, id: &TestId) -> Option<Classification> {
        if self.passed.iter().any(|r| &r.id == id) {
            Some(Classification::Passed)
        } else if self.failed.iter().any(|r| &r.id == id) {
            Some(Classification::Failed)
        } else if self.skipped.iter().any(|r| &r.id == id) {
            Some(Classification::Skipped)
        } else if self.ignored.contains(id) {
            Some(Classification::Ignored)
        } else {
            None
        }
    }

    /// Every id in any bucket.
    pub fn ids(&self) -> BTreeSet<TestId> {
        self.passed
            .iter()
            .chain(&self.failed)
            .chain(&self.skipped)
            .map(|r| r.id.clone())
            .chain(self.ignored.iter().cloned())
            .collect()
    }

    /// True if the buckets are pairwise disjoint and together equal `requested`.
    pub fn is_partition_of(&self, requested: &RequestedTestSet) -> bool {
        let ids = self.ids();
        ids.len() == self.len() && &ids == requested
    }
}

/// Classify every requested test against the decoded results.
///
/// Results for tests that were not requested are dropped.
pub fn reconcile(results: &ResultSet, requested: &RequestedTestSet) -> ReconciledOutcome {
    let mut outcome = ReconciledOutcome::default();

    for id in requested {
        match results.get(id) {
            Some(r) => match r.status {
                TestStatus::Passed => outcome.passed.push(r.clone()),
                TestStatus::Failed => outcome.failed.push(r.clone()),
                TestStatus::Skipped => outcome.skipped.push(r.clone()),
            },
            None => outcome.ignored.push(id.clone()),
        }
    }

    let unrequested = results.ids().filter(|id| !requested.contains(*id)).count();
    if unrequested > 0 {
        debug!(unrequested, "results artifact contains tests that were not requested");
    }

    outcome
}
