// src/artifacts/mod.rs

//! Ephemeral build artifacts owned by a single run.
//!
//! - [`writer`] produces the patched build descriptor and the focus file
//!   without touching the project's own descriptor.
//! - [`cleanup`] removes everything a run created, best effort.

pub mod cleanup;
pub mod writer;

use std::path::Path;

use crate::errors::{PipelineError, Result};
use crate::fs::FileSystem;

pub use cleanup::{remove_best_effort, CleanupReport};
pub use writer::{
    focus_lines, patch_descriptor, write_artifacts, ArtifactPaths, ArtifactRequest,
    WrittenArtifacts, PATCHED_SUFFIX,
};

/// Determine the project's base name.
///
/// A configured name wins. Otherwise the workspace root must contain exactly
/// one `.dme` that is not one of our own generated descriptors.
pub fn resolve_project_name(
    fs: &dyn FileSystem,
    root: &Path,
    configured: Option<&str>,
) -> Result<String> {
    if let Some(name) = configured {
        return Ok(name.to_string());
    }

    let entries = fs.read_dir(root).map_err(|e| {
        PipelineError::UserError(format!("cannot read workspace {}: {e:#}", root.display()))
    })?;

    let generated = format!(".{PATCHED_SUFFIX}.dme");
    let mut candidates: Vec<String> = entries
        .iter()
        .filter(|p| fs.is_file(p))
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .filter(|n| n.ends_with(".dme") && !n.ends_with(&generated))
        .map(|n| n.trim_end_matches(".dme").to_string())
        .collect();
    candidates.sort();

    match candidates.as_slice() {
        [one] => Ok(one.clone()),
        [] => Err(PipelineError::ConfigError(format!(
            "no .dme build descriptor found in {}; set project.name",
            root.display()
        ))),
        many => Err(PipelineError::ConfigError(format!(
            "several .dme files found in {} ({}); set project.name",
            root.display(),
            many.join(", ")
        ))),
    }
}
