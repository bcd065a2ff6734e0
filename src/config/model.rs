// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::types::ResultsFormat;

/// Placeholder substituted with a test's type path in `focus_template`.
pub const FOCUS_PLACEHOLDER: &str = "{0}";

/// Top-level configuration as read from `Dmtest.toml`.
///
/// ```toml
/// [project]
/// name = "tgstation"
/// defines = ["#define CIBUILDING"]
/// focus_template = "TEST_FOCUS({0})"
/// pre_build = ["tools/build/build --ci dm-prep"]
///
/// [compiler]
/// path = "/opt/byond/bin/DreamMaker"
///
/// [daemon]
/// path = "/opt/byond/bin/DreamDaemon"
/// log_dir = "data/logs/ci"
/// log_file = "game.log"
/// finished_pattern = "Round ended|Rebooting"
/// timeout = "15m"
///
/// [results]
/// format = "structured"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub project: ProjectSection,

    #[serde(default)]
    pub compiler: CompilerSection,

    #[serde(default)]
    pub daemon: DaemonSection,

    #[serde(default)]
    pub results: ResultsSection,

    #[serde(default)]
    pub discovery: DiscoverySection,
}

/// `[project]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    /// Base name of the build descriptor (`<name>.dme`).
    ///
    /// If `None`, the single `.dme` in the workspace root is used.
    #[serde(default)]
    pub name: Option<String>,

    /// Lines prepended verbatim to the patched descriptor.
    #[serde(default)]
    pub defines: Vec<String>,

    /// Line emitted once per requested test; `{0}` becomes the type path.
    #[serde(default = "default_focus_template")]
    pub focus_template: String,

    /// Shell commands run, in order, before the descriptor is patched.
    #[serde(default)]
    pub pre_build: Vec<String>,
}

fn default_focus_template() -> String {
    format!("TEST_FOCUS({FOCUS_PLACEHOLDER})")
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: None,
            defines: Vec::new(),
            focus_template: default_focus_template(),
            pre_build: Vec::new(),
        }
    }
}

/// `[compiler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CompilerSection {
    #[serde(default = "default_compiler_path")]
    pub path: String,
}

fn default_compiler_path() -> String {
    "DreamMaker".to_string()
}

impl Default for CompilerSection {
    fn default() -> Self {
        Self {
            path: default_compiler_path(),
        }
    }
}

/// `[daemon]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonSection {
    #[serde(default = "default_daemon_path")]
    pub path: String,

    /// Positional arguments passed after the compiled artifact.
    #[serde(default = "default_daemon_args")]
    pub args: Vec<String>,

    /// Directory, relative to the workspace, receiving the daemon's log.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// File name inside `log_dir` that carries the termination marker.
    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// Regex marking the end of the run inside `log_file`.
    #[serde(default = "default_finished_pattern")]
    pub finished_pattern: String,

    /// Optional upper bound on the daemon run, e.g. `"15m"`.
    #[serde(default)]
    pub timeout: Option<String>,
}

fn default_daemon_path() -> String {
    "DreamDaemon".to_string()
}

fn default_daemon_args() -> Vec<String> {
    ["-close", "-trusted", "-verbose", "-invisible"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_log_dir() -> String {
    "data/logs/ci".to_string()
}

fn default_log_file() -> String {
    "game.log".to_string()
}

fn default_finished_pattern() -> String {
    "Round ended|Rebooting".to_string()
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            path: default_daemon_path(),
            args: default_daemon_args(),
            log_dir: default_log_dir(),
            log_file: default_log_file(),
            finished_pattern: default_finished_pattern(),
            timeout: None,
        }
    }
}

/// `[results]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResultsSection {
    #[serde(default)]
    pub format: ResultsFormat,

    /// Artifact location relative to the workspace; defaults per format.
    #[serde(default)]
    pub path: Option<String>,
}

/// `[discovery]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverySection {
    #[serde(default = "default_discovery_include")]
    pub include: Vec<String>,

    /// Regex with one capture group yielding the bare test id.
    #[serde(default = "default_discovery_pattern")]
    pub pattern: String,
}

fn default_discovery_include() -> Vec<String> {
    vec!["code/modules/unit_tests/**/*.dm".to_string()]
}

fn default_discovery_pattern() -> String {
    r"^/datum/unit_test/([\w/]+)\s*$".to_string()
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            include: default_discovery_include(),
            pattern: default_discovery_pattern(),
        }
    }
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>`, so holders can rely on
/// the regexes compiling, the focus template carrying its placeholder and
/// the timeout being well-formed.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    raw: RawConfigFile,
    finished_pattern: Regex,
    discovery_pattern: Regex,
    timeout: Option<Duration>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        raw: RawConfigFile,
        finished_pattern: Regex,
        discovery_pattern: Regex,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            raw,
            finished_pattern,
            discovery_pattern,
            timeout,
        }
    }

    pub fn project(&self) -> &ProjectSection {
        &self.raw.project
    }

    pub fn compiler(&self) -> &CompilerSection {
        &self.raw.compiler
    }

    pub fn daemon(&self) -> &DaemonSection {
        &self.raw.daemon
    }

    pub fn discovery(&self) -> &DiscoverySection {
        &self.raw.discovery
    }

    pub fn results_format(&self) -> ResultsFormat {
        self.raw.results.format
    }

    /// Results artifact location relative to the workspace root.
    pub fn results_path(&self) -> PathBuf {
        match &self.raw.results.path {
            Some(p) => PathBuf::from(p),
            None => PathBuf::from(self.results_format().default_path()),
        }
    }

    pub fn finished_pattern(&self) -> &Regex {
        &self.finished_pattern
    }

    pub fn discovery_pattern(&self) -> &Regex {
        &self.discovery_pattern
    }

    pub fn daemon_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Directory watched for the daemon log, resolved against `root`.
    pub fn log_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.raw.daemon.log_dir)
    }
}
