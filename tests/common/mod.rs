#![allow(dead_code)]

//! Workspace fixtures for pipeline tests.
//!
//! A fixture is a temp directory holding a minimal project descriptor plus
//! two shell scripts standing in for the compiler and the daemon. Scripts
//! leave breadcrumbs in the workspace (`compiled.txt`, `daemon_args.txt`,
//! ...) so tests can see what ran after the pipeline has cleaned up.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

pub use dmtest_test_utils::{init_tracing, with_timeout, with_timeout_of, ConfigFileBuilder};

pub const PROJECT: &str = "tgstation";
pub const ORIGINAL_DME: &str = "#include \"code/_compile_options.dm\"\n";

/// Compiler that succeeds, printing the marker for the descriptor it was
/// handed and recording what it saw.
pub const OK_COMPILER: &str = r#"#!/bin/sh
base="${1%.dme}"
name=$(basename "$base")
cp "$1" dme_seen.txt
cp "${base}_focus.dm" focus_seen.txt
touch "$base.dmb" "$base.rsc"
echo "loading $name.dme"
echo "$name.dmb - 0 errors, 0 warnings" 1>&2
"#;

pub const FAILING_COMPILER: &str = r#"#!/bin/sh
echo "code/modules/unit_tests/foo.dm:3:error: undefined var"
echo "tgstation.test.dmb - 1 error, 0 warnings"
exit 1
"#;

/// Compiler that blocks until killed, recording its pid.
pub const HANGING_COMPILER: &str = r#"#!/bin/sh
echo $$ > compiler.pid
exec sleep 30
"#;

/// Daemon script body: records its arguments, then runs `$BODY`.
pub fn daemon_script(body: &str) -> String {
    format!(
        r#"#!/bin/sh
printf '%s\n' "$@" > daemon_args.tmp
mv daemon_args.tmp daemon_args.txt
{body}
"#
    )
}

/// Daemon that writes a structured results artifact, then the marker.
pub fn structured_daemon(results_json: &str) -> String {
    daemon_script(&format!(
        r#"mkdir -p data/logs/ci
cat > data/unit_tests.json <<'JSON'
{results_json}
JSON
echo "Starting up" > data/logs/ci/game.log
sleep 0.2
echo "Round ended. Rebooting." >> data/logs/ci/game.log
"#
    ))
}

pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new(compiler: &str, daemon: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(format!("{PROJECT}.dme")), ORIGINAL_DME).expect("write dme");
        let ws = Self { dir };
        ws.script("bin/DreamMaker", compiler);
        ws.script("bin/DreamDaemon", daemon);
        ws
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap_or_default()
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, contents).expect("write file");
    }

    /// Config pointing at this workspace's fake tools.
    pub fn config(&self) -> ConfigFileBuilder {
        ConfigFileBuilder::new()
            .compiler(&self.path("bin/DreamMaker").to_string_lossy())
            .daemon(&self.path("bin/DreamDaemon").to_string_lossy())
            .define("#define CIBUILDING")
    }

    /// Arguments the daemon was started with, one per line.
    pub fn daemon_args(&self) -> Vec<String> {
        self.read("daemon_args.txt").lines().map(str::to_string).collect()
    }

    /// Names of the generated files that are still present.
    pub fn leftover_generated_files(&self) -> Vec<String> {
        ["dme", "dmb", "rsc", "dyn.rsc", "lk", "int"]
            .iter()
            .map(|ext| format!("{PROJECT}.test.{ext}"))
            .chain(std::iter::once(format!("{PROJECT}.test_focus.dm")))
            .filter(|name| self.exists(name))
            .collect()
    }

    /// Poll until `rel` exists.
    pub async fn wait_for(&self, rel: &str) {
        let path = self.path(rel);
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[cfg(unix)]
    fn script(&self, rel: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        self.write(rel, body);
        let path = self.path(rel);
        let mut perms = fs::metadata(&path).expect("stat script").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod script");
    }

    #[cfg(not(unix))]
    fn script(&self, rel: &str, body: &str) {
        self.write(rel, body);
    }
}

/// Whether a process with `pid` still exists.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
