// src/artifacts/writer.rs

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::{validate_focus_template, FOCUS_PLACEHOLDER};
use crate::errors::{PipelineError, Result};
use crate::fs::FileSystem;
use crate::types::RequestedTestSet;

/// Suffix distinguishing generated files from the project's own.
pub const PATCHED_SUFFIX: &str = "test";

/// Names of every file a run creates next to the project descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    root: PathBuf,
    base_name: String,
}

impl ArtifactPaths {
    pub fn new(root: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_name: base_name.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// e.g. `tgstation.test`
    pub fn patched_name(&self) -> String {
        format!("{}.{PATCHED_SUFFIX}", self.base_name)
    }

    pub fn original_descriptor(&self) -> PathBuf {
        self.root.join(format!("{}.dme", self.base_name))
    }

    pub fn patched_descriptor(&self) -> PathBuf {
        self.root.join(format!("{}.dme", self.patched_name()))
    }

    pub fn focus_file_name(&self) -> String {
        format!("{}_focus.dm", self.patched_name())
    }

    pub fn focus_file(&self) -> PathBuf {
        self.root.join(self.focus_file_name())
    }

    pub fn compiled_binary(&self) -> PathBuf {
        self.root.join(format!("{}.dmb", self.patched_name()))
    }

    /// Substring the compiler prints when the patched descriptor built cleanly.
    pub fn compile_success_marker(&self) -> String {
        format!("{}.dmb - 0 errors", self.patched_name())
    }

    /// Every file owned by a run, deleted during cleanup.
    pub fn ephemeral_files(&self) -> Vec<PathBuf> {
        let patched = self.patched_name();
        let mut files = vec![self.patched_descriptor(), self.focus_file()];
        for ext in ["dmb", "rsc", "dyn.rsc", "lk", "int"] {
            files.push(self.root.join(format!("{patched}.{ext}")));
        }
        files
    }
}

/// The two files produced by [`write_artifacts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArtifacts {
    pub patched_descriptor: PathBuf,
    pub focus_file: PathBuf,
}

/// Inputs for [`write_artifacts`].
#[derive(Debug, Clone, Copy)]
pub struct ArtifactRequest<'a> {
    pub paths: &'a ArtifactPaths,
    pub defines: &'a [String],
    pub focus_template: &'a str,
    pub tests: &'a RequestedTestSet,
}

/// Produce the patched build descriptor and the focus file.
///
/// - The patched descriptor is the original with `defines` prepended and an
///   include of the focus file appended.
/// - The focus file has one `focus_template` line per requested test, with
///   the placeholder replaced by the test's type path.
///
/// The original descriptor is never modified. Nothing is written if the
/// template is invalid or the original descriptor is missing.
pub fn write_artifacts(fs: &dyn FileSystem, req: ArtifactRequest<'_>) -> Result<WrittenArtifacts> {
    validate_focus_template(req.focus_template)?;

    let original = req.paths.original_descriptor();
    if !fs.is_file(&original) {
        return Err(PipelineError::ConfigError(format!(
            "build descriptor {} not found",
            original.display()
        )));
    }
    let source = fs.read_to_string(&original).map_err(|e| {
        PipelineError::ConfigError(format!("reading build descriptor: {e:#}"))
    })?;

    let patched = patch_descriptor(&source, req.defines, &req.paths.focus_file_name());
    let focus = focus_lines(req.focus_template, req.tests);

    let written = WrittenArtifacts {
        patched_descriptor: req.paths.patched_descriptor(),
        focus_file: req.paths.focus_file(),
    };

    write_file(fs, &written.focus_file, &focus)?;
    write_file(fs, &written.patched_descriptor, &patched)?;

    info!(
        descriptor = %written.patched_descriptor.display(),
        focus = %written.focus_file.display(),
        tests = req.tests.len(),
        defines = req.defines.len(),
        "wrote patched build descriptor"
    );
    Ok(written)
}

fn write_file(fs: &dyn FileSystem, path: &Path, contents: &str) -> Result<()> {
    fs.write(path, contents.as_bytes())
        .map_err(|e| PipelineError::run(format!("writing generated file: {e:#}")))
}

/// Defines first, then the untouched original, then the focus include.
pub fn patch_descriptor(source: &str, defines: &[String], focus_file_name: &str) -> String {
    let mut out = String::with_capacity(source.len() + 256);
    for define in defines {
        out.push_str(define.trim_end());
        out.push('\n');
    }
    out.push_str(source);
    if !source.is_empty() && !source.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!("#include \"{focus_file_name}\"\n"));
    out
}

/// One template line per test, placeholder replaced by the type path.
pub fn focus_lines(template: &str, tests: &RequestedTestSet) -> String {
    let mut out = String::new();
    for id in tests {
        let line = template.replace(FOCUS_PLACEHOLDER, &id.type_path());
        debug!(test = %id, %line, "focus line");
        out.push_str(&line);
        out.push('\n');
    }
    out
}
