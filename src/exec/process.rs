// src/exec/process.rs

//! Short-lived external commands (pre-build steps, the compiler).

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{PipelineError, Result};

/// How long to keep collecting output after the process has exited.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// A command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Wrap a free-form command string in the platform shell.
    pub fn shell(command: &str) -> Self {
        if cfg!(windows) {
            Self::new("cmd", vec!["/C".to_string(), command.to_string()])
        } else {
            Self::new("sh", vec!["-c".to_string(), command.to_string()])
        }
    }

    /// Program and arguments joined by spaces, for logs and dry-run output.
    pub fn command_line(&self) -> String {
        let mut s = self.program.display().to_string();
        for arg in &self.args {
            s.push(' ');
            s.push_str(arg);
        }
        s
    }
}

/// Combined stdout/stderr of a finished process, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub text: String,
    pub exit_code: Option<i32>,
    pub success: bool,
}

/// Run `spec` to completion and capture its output.
///
/// - stdout and stderr are merged line by line as they arrive. Invalid
///   UTF-8 is replaced, never fatal.
/// - The call returns once the process exits, even if a background child
///   still holds the output pipes.
/// - If `cancel` fires before the process exits, the process is killed and
///   `PipelineError::Cancelled` is returned.
/// - A program that cannot be found is a `ConfigError`; any other spawn or
///   wait failure is a `RunError`. The exit status is reported, not judged:
///   callers decide what counts as success.
pub async fn run_process(spec: &ProcessSpec, cancel: &CancellationToken) -> Result<CapturedOutput> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    info!(command = %spec.command_line(), "starting process");

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| spawn_error(&spec.program, e))?;
    let pid = child.id();

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, line_tx.clone(), "stdout");
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, line_tx.clone(), "stderr");
    }
    drop(line_tx);

    let mut text = String::new();
    let mut streams_open = true;

    let status = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!(?pid, command = %spec.command_line(), "cancellation requested; killing process");
                if let Err(e) = child.kill().await {
                    warn!(?pid, error = %e, "failed to kill process on cancellation");
                }
                return Err(PipelineError::Cancelled);
            }

            line = line_rx.recv(), if streams_open => {
                match line {
                    Some(line) => push_line(&mut text, &line),
                    None => streams_open = false,
                }
            }

            status = child.wait() => {
                break status.map_err(|e| {
                    PipelineError::run_with_output(
                        format!("waiting for '{}' failed: {e}", spec.program.display()),
                        text.clone(),
                    )
                })?;
            }
        }
    };

    if streams_open {
        drain_after_exit(&mut line_rx, &mut text, pid).await;
    }

    let exit_code = status.code();
    info!(
        ?pid,
        exit_code = ?exit_code,
        success = status.success(),
        "process exited"
    );

    Ok(CapturedOutput {
        text,
        exit_code,
        success: status.success(),
    })
}

fn spawn_error(program: &Path, err: std::io::Error) -> PipelineError {
    if err.kind() == IoErrorKind::NotFound {
        PipelineError::ConfigError(format!(
            "executable '{}' was not found; check the configured path",
            program.display()
        ))
    } else {
        PipelineError::run(format!("spawning '{}' failed: {err}", program.display()))
    }
}

fn push_line(text: &mut String, line: &str) {
    text.push_str(line);
    text.push('\n');
}

/// Collect output still in flight once the process has exited.
///
/// A background child that inherited the pipes can keep them open long after
/// the process we waited on is gone, so this stops at `OUTPUT_DRAIN_GRACE`
/// instead of waiting for EOF.
async fn drain_after_exit(
    rx: &mut mpsc::UnboundedReceiver<String>,
    text: &mut String,
    pid: Option<u32>,
) {
    let deadline = Instant::now() + OUTPUT_DRAIN_GRACE;
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(line)) => push_line(text, &line),
            Ok(None) => return,
            Err(_) => {
                debug!(?pid, "output pipes still open after exit; keeping what arrived");
                return;
            }
        }
    }
}

/// Decode one raw line, dropping the `\n` / `\r\n` terminator. Bytes that are
/// not UTF-8 (legacy code pages in paths or compiler messages) become U+FFFD.
fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && raw[end - 1] == b'\r' {
        end -= 1;
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn forward_lines<R>(stream: R, tx: mpsc::UnboundedSender<String>, label: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = decode_line(&buf);
                    debug!(stream = label, "{}", line);
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(stream = label, error = %e, "stopped reading process output");
                    break;
                }
            }
        }
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn captures_both_streams() {
        let cancel = CancellationToken::new();
        let out = run_process(&ProcessSpec::shell("echo out; echo err 1>&2; exit 3"), &cancel)
            .await
            .unwrap();
        assert!(out.text.contains("out\n"));
        assert!(out.text.contains("err\n"));
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success);
    }

    #[tokio::test]
    async fn non_utf8_output_is_kept_lossily() {
        let cancel = CancellationToken::new();
        let spec = ProcessSpec::shell(
            "printf 'caf\\351 path\\r\\n'; echo 'tgstation.test.dmb - 0 errors, 0 warnings'",
        );
        let out = run_process(&spec, &cancel).await.unwrap();
        assert!(out.text.contains("caf\u{FFFD} path\n"), "{:?}", out.text);
        assert!(out.text.contains("tgstation.test.dmb - 0 errors, 0 warnings\n"));
        assert!(out.success);
    }

    #[tokio::test]
    async fn returns_when_process_exits_even_if_pipes_stay_open() {
        let cancel = CancellationToken::new();
        let spec = ProcessSpec::shell("sleep 20 & echo done");
        let out = tokio::time::timeout(Duration::from_secs(5), run_process(&spec, &cancel))
            .await
            .expect("run_process should return once the shell exits")
            .unwrap();
        assert!(out.text.contains("done\n"));
        assert!(out.success);
    }

    #[test]
    fn decode_line_strips_terminators() {
        assert_eq!(decode_line(b"abc\r\n"), "abc");
        assert_eq!(decode_line(b"abc\n"), "abc");
        assert_eq!(decode_line(b"abc"), "abc");
        assert_eq!(decode_line(b"\xff\n"), "\u{FFFD}");
    }

    #[tokio::test]
    async fn missing_program_is_a_config_error() {
        let cancel = CancellationToken::new();
        let spec = ProcessSpec::new("/definitely/not/here/DreamMaker", vec![]);
        let err = run_process(&spec, &cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)), "{err:?}");
    }

    #[tokio::test]
    async fn cancellation_kills_the_process() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = run_process(&ProcessSpec::shell("exec sleep 30"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn already_cancelled_signal_never_spawns() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let spec = ProcessSpec::new("/definitely/not/here", vec![]);
        assert!(run_process(&spec, &cancel).await.unwrap_err().is_cancelled());
    }
}
