// src/artifacts/cleanup.rs

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::fs::FileSystem;

/// What a best-effort removal pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Delete every path in `files` that exists.
///
/// Individual failures are logged and recorded, never returned as errors:
/// cleanup must run to the end on every exit path.
pub fn remove_best_effort<P: AsRef<Path>>(fs: &dyn FileSystem, files: &[P]) -> CleanupReport {
    let mut report = CleanupReport::default();

    for path in files {
        let path = path.as_ref();
        if !fs.exists(path) {
            continue;
        }
        match fs.remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed file");
                report.removed.push(path.to_path_buf());
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove file; continuing");
                report.failed.push(path.to_path_buf());
            }
        }
    }

    report
}
