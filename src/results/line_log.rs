// src/results/line_log.rs

//! Decoder for the plain-text results log.
//!
//! ```text
//! [12:00:01] PASS: /datum/unit_test/a
//! [12:00:02] FAIL: /datum/unit_test/b
//!  - 	expected 2 got 3 at code/modules/unit_tests/b.dm:10
//! [12:00:03] ...
//! ```
//!
//! Lines following a `FAIL:` line, up to the next line beginning with `[`,
//! form the failure message. Each continuation line has its leading `-`
//! bullet and surrounding whitespace removed.

use std::sync::LazyLock;

use regex::Regex;

use crate::results::ResultSet;
use crate::types::{TestId, TestStatus};

static PASS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"PASS: /datum/unit_test/(\S+)").expect("valid PASS regex"));

static FAIL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"FAIL: /datum/unit_test/(\S+)").expect("valid FAIL regex"));

/// Collects continuation lines for the failure currently being read.
struct PendingFailure {
    id: TestId,
    lines: Vec<String>,
}

impl PendingFailure {
    fn finish(self, set: &mut ResultSet) {
        let message = if self.lines.is_empty() {
            None
        } else {
            Some(self.lines.join("\n"))
        };
        set.record(self.id, TestStatus::Failed, message);
    }
}

pub fn parse_line_log(text: &str) -> ResultSet {
    let mut set = ResultSet::default();
    let mut pending: Option<PendingFailure> = None;

    for line in text.lines() {
        if let Some(caps) = PASS_LINE.captures(line) {
            if let Some(p) = pending.take() {
                p.finish(&mut set);
            }
            set.record(TestId::new(&caps[1]), TestStatus::Passed, None);
            continue;
        }

        if let Some(caps) = FAIL_LINE.captures(line) {
            if let Some(p) = pending.take() {
                p.finish(&mut set);
            }
            pending = Some(PendingFailure {
                id: TestId::new(&caps[1]),
                lines: Vec::new(),
            });
            continue;
        }

        if line.starts_with('[') {
            if let Some(p) = pending.take() {
                p.finish(&mut set);
            }
            continue;
        }

        if let Some(p) = pending.as_mut() {
            let stripped = strip_continuation(line);
            if !stripped.is_empty() {
                p.lines.push(stripped.to_string());
            }
        }
    }

    if let Some(p) = pending.take() {
        p.finish(&mut set);
    }

    set
}

fn strip_continuation(line: &str) -> &str {
    let line = line.trim_start();
    line.strip_prefix('-').unwrap_or(line).trim()
}
