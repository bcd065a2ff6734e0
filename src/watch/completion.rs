// src/watch/completion.rs

//! Two-phase completion detection for the daemon's log file.
//!
//! Phase A watches the log *directory* until the expected file appears.
//! Phase B then watches the *file* and re-reads it on every change until the
//! termination marker shows up.
//!
//! ```text
//! NotStarted --start()--> WatchingDirectory --file appears--> WatchingFile --marker--> Finished
//! ```
//!
//! The phase-A handle is dropped (with its event channel) before the
//! phase-B handle is registered, so content events can never be observed
//! before the file has been seen.

use std::path::{Path, PathBuf};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use regex::Regex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::{PipelineError, Result};

type WatchEvent = notify::Result<Event>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    NotStarted,
    WatchingDirectory,
    WatchingFile,
    Finished,
}

/// A registered notify watcher plus the channel its callback feeds.
///
/// Dropping this stops the watch.
struct ActiveWatch {
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<WatchEvent>,
}

impl ActiveWatch {
    fn register(path: &Path) -> Result<Self> {
        let (event_tx, events) = mpsc::unbounded_channel::<WatchEvent>();

        // Called synchronously by notify. A failed send only means the
        // receiver is gone because the watch is being closed.
        let mut watcher = RecommendedWatcher::new(
            move |res: WatchEvent| {
                let _ = event_tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| PipelineError::run(format!("creating file watcher: {e}")))?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| PipelineError::run(format!("watching {}: {e}", path.display())))?;

        Ok(Self {
            _watcher: watcher,
            events,
        })
    }
}

pub struct CompletionWatch {
    dir: PathBuf,
    file_name: String,
    marker: Regex,
    phase: WatchPhase,
    active: Option<ActiveWatch>,
}

impl std::fmt::Debug for CompletionWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionWatch")
            .field("dir", &self.dir)
            .field("file_name", &self.file_name)
            .field("phase", &self.phase)
            .field("active", &self.active.is_some())
            .finish()
    }
}

impl CompletionWatch {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>, marker: Regex) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
            marker,
            phase: WatchPhase::NotStarted,
            active: None,
        }
    }

    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    /// Full path of the watched log file.
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Whether any notify handle is still registered.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Begin phase A. Creates the log directory if it does not exist yet so
    /// that it can be watched.
    ///
    /// Must be called before the daemon is launched so no creation event can
    /// be missed.
    pub async fn start(&mut self) -> Result<()> {
        if self.phase != WatchPhase::NotStarted {
            return Err(PipelineError::run("completion watch started twice"));
        }

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            PipelineError::ConfigError(format!(
                "cannot create daemon log directory {}: {e}",
                self.dir.display()
            ))
        })?;

        self.active = Some(ActiveWatch::register(&self.dir)?);
        self.phase = WatchPhase::WatchingDirectory;
        info!(dir = %self.dir.display(), file = %self.file_name, "watching for daemon log file");

        if self.file_path().is_file() {
            debug!("log file already present when watch started");
            self.enter_file_phase().await?;
        }
        Ok(())
    }

    /// Resolve once the termination marker has been observed.
    ///
    /// Cancel-safe: dropping the future leaves the watch in its current
    /// phase.
    pub async fn wait_finished(&mut self) -> Result<()> {
        loop {
            match self.phase {
                WatchPhase::NotStarted => {
                    return Err(PipelineError::run("completion watch was never started"));
                }
                WatchPhase::Finished => return Ok(()),
                WatchPhase::WatchingDirectory | WatchPhase::WatchingFile => {}
            }

            let event = match self.active.as_mut() {
                Some(active) => active.events.recv().await,
                None => return Err(PipelineError::run("completion watch already closed")),
            };

            match event {
                Some(Ok(event)) => self.on_event(event).await?,
                Some(Err(e)) => {
                    return Err(PipelineError::run(format!("file watch error: {e}")));
                }
                None => {
                    return Err(PipelineError::run("file watch stream ended unexpectedly"));
                }
            }
        }
    }

    /// Drop every registered handle. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.active.take().is_some() {
            debug!(phase = ?self.phase, "completion watch closed");
        }
    }

    async fn on_event(&mut self, event: Event) -> Result<()> {
        debug!(?event, phase = ?self.phase, "received notify event");

        if matches!(event.kind, EventKind::Access(_) | EventKind::Remove(_)) {
            return Ok(());
        }

        match self.phase {
            WatchPhase::WatchingDirectory => {
                let wanted = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().is_some_and(|n| n == self.file_name.as_str()));
                if wanted {
                    self.enter_file_phase().await?;
                }
            }
            WatchPhase::WatchingFile => self.check_marker().await,
            WatchPhase::NotStarted | WatchPhase::Finished => {}
        }
        Ok(())
    }

    async fn enter_file_phase(&mut self) -> Result<()> {
        let file = self.file_path();

        // Replace (and thereby drop) the directory watch first.
        self.active = None;
        self.active = Some(ActiveWatch::register(&file)?);
        self.phase = WatchPhase::WatchingFile;
        info!(file = %file.display(), "daemon log file appeared; watching its content");

        // Content may have been written before the file watch was registered.
        self.check_marker().await;
        Ok(())
    }

    async fn check_marker(&mut self) {
        let file = self.file_path();
        match tokio::fs::read(&file).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                if self.marker.is_match(&text) {
                    info!(file = %file.display(), "termination marker observed");
                    self.phase = WatchPhase::Finished;
                }
            }
            Err(e) => {
                debug!(file = %file.display(), error = %e, "log file not readable yet");
            }
        }
    }
}
