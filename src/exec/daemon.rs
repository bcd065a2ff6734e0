// src/exec/daemon.rs

//! Launching and supervising the long-running daemon.
//!
//! The daemon is started detached and never waited on: its exit status is
//! not reliable across platforms. Completion is inferred from its log file
//! (see [`crate::watch::completion`]), and termination goes through the OS
//! process list, using a per-run correlation token embedded in the daemon's
//! arguments to find the right instance.

use std::future::pending;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{PipelineError, Result};
use crate::exec::proc_table::{find_tagged, ProcessTable};
use crate::watch::completion::{CompletionWatch, WatchPhase};

/// Random value tagging one daemon launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationToken(u32);

impl CorrelationToken {
    pub fn generate() -> Self {
        Self(rand::rng().random_range(100_000..u32::MAX))
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// The `key=value` pair searched for in process arguments.
    pub fn param(&self) -> String {
        format!("test-id={}", self.0)
    }

    /// Trailing arguments appended to the daemon command line.
    pub fn invocation_args(&self) -> [String; 2] {
        ["-params".to_string(), self.param()]
    }
}

/// Everything needed to start the daemon and recognise when it is done.
#[derive(Debug, Clone)]
pub struct DaemonInvocation {
    pub executable: PathBuf,
    /// Positional arguments, including the compiled artifact.
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub log_dir: PathBuf,
    pub log_file: String,
    pub finished_pattern: Regex,
    pub timeout: Option<Duration>,
}

impl DaemonInvocation {
    /// Full argument list for a launch tagged with `token`.
    pub fn args_with_token(&self, token: &CorrelationToken) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend(token.invocation_args());
        args
    }
}

/// Why a session is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// The termination marker was observed.
    Completed,
    /// The run's cancellation signal fired.
    Cancelled,
    /// The watch failed or timed out; the daemon is no longer supervised.
    Abandoned,
}

/// What a teardown actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// An earlier teardown already ran; nothing was touched.
    AlreadyTornDown,
    /// Watch handles released; no kill was needed.
    Released,
    Killed(u32),
    KillFailed(u32),
    /// No process carried the token (it already exited).
    NotFound,
    /// More than one process carried the token.
    MultipleMatches(usize),
}

/// One launched daemon plus the resources watching it.
///
/// `torn_down` is orthogonal to the watch phase and is checked before any
/// teardown action, so releasing handles and killing the process happen at
/// most once no matter how completion, cancellation and errors interleave.
#[derive(Debug)]
pub struct DaemonSession {
    token: CorrelationToken,
    executable: PathBuf,
    watch: CompletionWatch,
    table: Arc<dyn ProcessTable>,
    torn_down: bool,
}

impl DaemonSession {
    pub fn new(
        token: CorrelationToken,
        executable: PathBuf,
        watch: CompletionWatch,
        table: Arc<dyn ProcessTable>,
    ) -> Self {
        Self {
            token,
            executable,
            watch,
            table,
            torn_down: false,
        }
    }

    pub fn token(&self) -> CorrelationToken {
        self.token
    }

    pub fn watch_mut(&mut self) -> &mut CompletionWatch {
        &mut self.watch
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn teardown(&mut self, reason: TeardownReason) -> TeardownOutcome {
        if self.torn_down {
            debug!(token = self.token.value(), ?reason, "daemon session already torn down");
            return TeardownOutcome::AlreadyTornDown;
        }
        self.torn_down = true;

        let finished = self.watch.phase() == WatchPhase::Finished;
        self.watch.close();

        if reason == TeardownReason::Completed || finished {
            debug!(token = self.token.value(), ?reason, "daemon finished; nothing to kill");
            return TeardownOutcome::Released;
        }

        self.terminate()
    }

    fn terminate(&self) -> TeardownOutcome {
        let param = self.token.param();
        let matches = find_tagged(self.table.as_ref(), &self.executable, &param);

        match matches.as_slice() {
            [] => {
                info!(token = self.token.value(), "no daemon process carries the run token");
                TeardownOutcome::NotFound
            }
            [process] => {
                if self.table.kill(process.pid) {
                    info!(pid = process.pid, token = self.token.value(), "killed daemon process");
                    TeardownOutcome::Killed(process.pid)
                } else {
                    warn!(pid = process.pid, token = self.token.value(), "failed to kill daemon process");
                    TeardownOutcome::KillFailed(process.pid)
                }
            }
            many => {
                let pids: Vec<u32> = many.iter().map(|p| p.pid).collect();
                warn!(?pids, token = self.token.value(), "several daemon processes carry the same run token");
                TeardownOutcome::MultipleMatches(many.len())
            }
        }
    }
}

/// Starts the daemon and waits for it to finish.
#[derive(Debug, Clone)]
pub struct DaemonManager {
    table: Arc<dyn ProcessTable>,
}

impl DaemonManager {
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self { table }
    }

    /// Launch the daemon and resolve once its log shows the termination
    /// marker.
    ///
    /// - Cancellation stops the watch, kills the tagged process and yields
    ///   `Cancelled` (or `RunError` if several processes carry the token).
    /// - A watch error or an elapsed timeout also kills the tagged process
    ///   and yields `RunError`.
    pub async fn run_daemon(&self, invocation: &DaemonInvocation, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let token = CorrelationToken::generate();
        let mut watch = CompletionWatch::new(
            &invocation.log_dir,
            &invocation.log_file,
            invocation.finished_pattern.clone(),
        );
        watch.start().await?;

        if let Err(e) = launch_detached(invocation, &token) {
            watch.close();
            return Err(e);
        }

        let mut session = DaemonSession::new(
            token,
            invocation.executable.clone(),
            watch,
            Arc::clone(&self.table),
        );

        let result = tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(PipelineError::Cancelled),

            res = session.watch_mut().wait_finished() => res,

            _ = deadline(invocation.timeout) => Err(PipelineError::run(format!(
                "daemon did not finish within {:?}",
                invocation.timeout.unwrap_or_default()
            ))),
        };

        let reason = match &result {
            Ok(()) => TeardownReason::Completed,
            Err(PipelineError::Cancelled) => TeardownReason::Cancelled,
            Err(_) => TeardownReason::Abandoned,
        };

        match session.teardown(reason) {
            TeardownOutcome::MultipleMatches(n) => Err(PipelineError::run(format!(
                "found {n} daemon processes tagged with {}; refusing to pick one",
                token.param()
            ))),
            _ => result,
        }
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => pending().await,
    }
}

fn launch_detached(invocation: &DaemonInvocation, token: &CorrelationToken) -> Result<()> {
    let args = invocation.args_with_token(token);
    info!(
        executable = %invocation.executable.display(),
        ?args,
        token = token.value(),
        "launching daemon"
    );

    let child = Command::new(&invocation.executable)
        .args(&args)
        .current_dir(&invocation.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::ConfigError(format!(
                    "daemon executable '{}' was not found; check the configured path",
                    invocation.executable.display()
                ))
            } else {
                PipelineError::run(format!(
                    "launching daemon '{}' failed: {e}",
                    invocation.executable.display()
                ))
            }
        })?;

    debug!(pid = ?child.id(), "daemon launched; not waiting on it");
    // Dropping the handle does not kill the process (no kill_on_drop).
    drop(child);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::proc_table::ProcessEntry;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingTable {
        processes: Vec<ProcessEntry>,
        kills: Mutex<Vec<u32>>,
    }

    impl ProcessTable for RecordingTable {
        fn snapshot(&self) -> Vec<ProcessEntry> {
            self.processes.clone()
        }

        fn kill(&self, pid: u32) -> bool {
            self.kills.lock().unwrap().push(pid);
            true
        }
    }

    fn tagged(pid: u32, token: &CorrelationToken) -> ProcessEntry {
        ProcessEntry {
            pid,
            name: "DreamDaemon".to_string(),
            exe: None,
            args: vec!["tgstation.test.dmb".to_string(), "-params".to_string(), token.param()],
        }
    }

    fn session(table: Arc<RecordingTable>, token: CorrelationToken) -> DaemonSession {
        let watch = CompletionWatch::new("unused", "game.log", Regex::new("Rebooting").unwrap());
        DaemonSession::new(token, PathBuf::from("DreamDaemon"), watch, table)
    }

    #[test]
    fn token_args_use_params_form() {
        let token = CorrelationToken::generate();
        let [flag, value] = token.invocation_args();
        assert_eq!(flag, "-params");
        assert_eq!(value, format!("test-id={}", token.value()));
    }

    #[test]
    fn completion_then_cancel_never_kills() {
        let token = CorrelationToken::generate();
        let table = Arc::new(RecordingTable {
            processes: vec![tagged(10, &token)],
            ..Default::default()
        });
        let mut s = session(Arc::clone(&table), token);

        assert_eq!(s.teardown(TeardownReason::Completed), TeardownOutcome::Released);
        assert_eq!(s.teardown(TeardownReason::Cancelled), TeardownOutcome::AlreadyTornDown);
        assert!(table.kills.lock().unwrap().is_empty());
    }

    #[test]
    fn double_cancel_kills_once() {
        let token = CorrelationToken::generate();
        let table = Arc::new(RecordingTable {
            processes: vec![tagged(10, &token)],
            ..Default::default()
        });
        let mut s = session(Arc::clone(&table), token);

        assert_eq!(s.teardown(TeardownReason::Cancelled), TeardownOutcome::Killed(10));
        assert_eq!(s.teardown(TeardownReason::Cancelled), TeardownOutcome::AlreadyTornDown);
        assert_eq!(*table.kills.lock().unwrap(), vec![10]);
        assert!(s.is_torn_down());
    }

    #[test]
    fn other_runs_are_left_alone() {
        let token = CorrelationToken(424_242);
        let other = CorrelationToken(111_111);
        let table = Arc::new(RecordingTable {
            processes: vec![tagged(20, &other)],
            ..Default::default()
        });
        let mut s = session(Arc::clone(&table), token);

        assert_eq!(s.teardown(TeardownReason::Cancelled), TeardownOutcome::NotFound);
        assert!(table.kills.lock().unwrap().is_empty());
    }

    #[test]
    fn duplicate_tags_are_reported_not_killed() {
        let token = CorrelationToken::generate();
        let table = Arc::new(RecordingTable {
            processes: vec![tagged(1, &token), tagged(2, &token)],
            ..Default::default()
        });
        let mut s = session(Arc::clone(&table), token);

        assert_eq!(s.teardown(TeardownReason::Abandoned), TeardownOutcome::MultipleMatches(2));
        assert!(table.kills.lock().unwrap().is_empty());
    }
}
