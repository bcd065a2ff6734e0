// src/pipeline/report.rs

use std::io::{self, Write};

use crate::errors::PipelineError;
use crate::pipeline::{RunReport, Verdict};

/// Print `report` to stdout. Logs stay on stderr.
pub fn print_report(report: &RunReport) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_report(&mut out, report)
}

pub fn write_report<W: Write>(out: &mut W, report: &RunReport) -> io::Result<()> {
    for entry in &report.entries {
        match &entry.verdict {
            Verdict::Passed => writeln!(out, "PASS    {}", entry.id)?,
            Verdict::Failed { message } => {
                writeln!(out, "FAIL    {}", entry.id)?;
                if let Some(msg) = message {
                    for line in msg.lines() {
                        writeln!(out, "          {line}")?;
                    }
                }
            }
            Verdict::Skipped => writeln!(out, "SKIP    {}", entry.id)?,
            Verdict::Ignored => writeln!(out, "SKIP    {} (no result reported)", entry.id)?,
            Verdict::Errored { .. } => writeln!(out, "ERROR   {}", entry.id)?,
        }
    }

    match &report.error {
        None | Some(PipelineError::Cancelled) => {}
        Some(e) => {
            writeln!(out)?;
            writeln!(out, "{e}")?;
            if let Some(output) = e.output() {
                writeln!(out, "--- captured output ---")?;
                write!(out, "{output}")?;
                if !output.ends_with('\n') {
                    writeln!(out)?;
                }
            }
        }
    }

    let c = report.counts();
    writeln!(out)?;
    if report.is_cancelled() {
        writeln!(out, "cancelled: {} skipped", c.skipped)?;
    } else {
        writeln!(
            out,
            "{} passed, {} failed, {} skipped, {} errored",
            c.passed,
            c.failed,
            c.skipped + c.ignored,
            c.errored
        )?;
    }
    Ok(())
}
