// src/exec/proc_table.rs

//! OS process lookup for processes we do not hold a handle to.
//!
//! The daemon is launched detached, so the only way back to it is through
//! the system process list: match the executable name and look for the
//! run's correlation parameter among the arguments.

use std::fmt::Debug;
use std::path::Path;

use sysinfo::{Pid, ProcessesToUpdate, System};

/// A single row of the process list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    pub exe: Option<String>,
    pub args: Vec<String>,
}

impl ProcessEntry {
    /// True if this process runs `executable` (compared by file stem,
    /// case-insensitively, so `DreamDaemon` matches `DreamDaemon.exe`).
    pub fn runs_executable(&self, executable: &Path) -> bool {
        let Some(want) = stem_lower(&executable.to_string_lossy()) else {
            return false;
        };
        let candidates = [
            Some(self.name.as_str()),
            self.exe.as_deref(),
            self.args.first().map(String::as_str),
        ];
        candidates
            .into_iter()
            .flatten()
            .filter_map(stem_lower)
            .any(|stem| stem == want)
    }

    /// True if one of the arguments carries `param` as a whole `key=value`
    /// pair (params may be `&`-joined, as in `a=1&test-id=42`).
    pub fn carries_param(&self, param: &str) -> bool {
        self.args.iter().any(|arg| {
            arg.trim_matches('"')
                .split(['&', ';', ' '])
                .any(|pair| pair == param)
        })
    }
}

fn stem_lower(s: &str) -> Option<String> {
    // Accept both separators regardless of host platform.
    let last = s.rsplit(['/', '\\']).next()?;
    let stem = Path::new(last).file_stem()?.to_string_lossy().to_lowercase();
    if stem.is_empty() { None } else { Some(stem) }
}

/// Abstraction over the system process list.
///
/// Production code uses [`SystemProcessTable`]; tests provide a fake that
/// records kill attempts.
pub trait ProcessTable: Send + Sync + Debug {
    fn snapshot(&self) -> Vec<ProcessEntry>;

    /// Forcibly terminate `pid`. Returns false if nothing was killed.
    fn kill(&self, pid: u32) -> bool;
}

/// `sysinfo`-backed process table.
#[derive(Debug, Clone, Default)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn snapshot(&self) -> Vec<ProcessEntry> {
        let system = System::new_all();
        system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
                exe: process.exe().map(|p| p.to_string_lossy().into_owned()),
                args: process
                    .cmd()
                    .iter()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect(),
            })
            .collect()
    }

    fn kill(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(|p| p.kill()).unwrap_or(false)
    }
}

/// All processes running `executable` whose arguments carry `param`.
pub fn find_tagged(table: &dyn ProcessTable, executable: &Path, param: &str) -> Vec<ProcessEntry> {
    table
        .snapshot()
        .into_iter()
        .filter(|p| p.runs_executable(executable) && p.carries_param(param))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, args: &[&str]) -> ProcessEntry {
        ProcessEntry {
            pid: 7,
            name: name.to_string(),
            exe: None,
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn executable_matches_by_stem() {
        let p = entry("DreamDaemon.exe", &[]);
        assert!(p.runs_executable(Path::new("C:\\BYOND\\bin\\dreamdaemon.exe")));
        assert!(p.runs_executable(Path::new("/opt/byond/bin/DreamDaemon")));
        assert!(!p.runs_executable(Path::new("DreamMaker")));
    }

    #[test]
    fn long_names_fall_back_to_argv0() {
        // Linux truncates comm to 15 bytes.
        let p = entry("DreamDaemonWrap", &["/usr/bin/DreamDaemonWrapper", "x.dmb"]);
        assert!(p.runs_executable(Path::new("DreamDaemonWrapper")));
    }

    #[test]
    fn params_match_whole_pairs_only() {
        let p = entry("DreamDaemon", &["x.dmb", "-params", "\"a=1&test-id=42\""]);
        assert!(p.carries_param("test-id=42"));
        assert!(!p.carries_param("test-id=4"));
        assert!(!entry("DreamDaemon", &["test-id=421"]).carries_param("test-id=42"));
    }
}
