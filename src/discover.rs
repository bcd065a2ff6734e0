// src/discover.rs

//! Static test discovery.
//!
//! Walks the workspace, keeps source files matching the configured include
//! globs and scans them line by line for unit test type declarations, e.g.
//!
//! ```text
//! /datum/unit_test/reagent_recipes
//! ```
//!
//! The pipeline itself never calls this; it is only used by the binary to
//! build a requested set when no `--test` is given, and by `--list`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use tracing::debug;

use crate::config::ConfigFile;
use crate::fs::FileSystem;
use crate::types::TestId;

/// Compiled discovery settings.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    include: GlobSet,
    pattern: Regex,
}

impl DiscoverySettings {
    pub fn new(include: &[String], pattern: Regex) -> Result<Self> {
        Ok(Self {
            include: build_globset(include)?,
            pattern,
        })
    }

    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Self::new(&cfg.discovery().include, cfg.discovery_pattern().clone())
    }

    /// `rel_path` uses forward slashes and is relative to the workspace root.
    pub fn includes(&self, rel_path: &str) -> bool {
        self.include.is_match(rel_path)
    }

    /// Bare test ids declared in `source`.
    pub fn scan<'a>(&'a self, source: &'a str) -> impl Iterator<Item = TestId> + 'a {
        source.lines().filter_map(|line| {
            let caps = self.pattern.captures(line)?;
            let id = caps.get(1)?.as_str().trim();
            (!id.is_empty()).then(|| TestId::new(id))
        })
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Every file under `root` whose relative path matches the include globs.
pub fn collect_matching_files(
    fs: &dyn FileSystem,
    root: &Path,
    settings: &DiscoverySettings,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for path in fs.read_dir(&dir)? {
            if fs.is_dir(&path) {
                stack.push(path);
            } else if fs.is_file(&path) {
                if let Ok(rel) = path.strip_prefix(root) {
                    let rel_str = rel.to_string_lossy().replace('\\', "/");
                    if settings.includes(&rel_str) {
                        files.push(path);
                    }
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Sorted, de-duplicated ids of every test declared under `root`.
pub fn discover_tests(
    fs: &dyn FileSystem,
    root: &Path,
    settings: &DiscoverySettings,
) -> Result<Vec<TestId>> {
    let mut found = BTreeSet::new();

    for file in collect_matching_files(fs, root, settings)? {
        let source = fs
            .read_to_string(&file)
            .with_context(|| format!("reading {}", file.display()))?;
        let before = found.len();
        found.extend(settings.scan(&source));
        debug!(file = %file.display(), new = found.len() - before, "scanned for tests");
    }

    Ok(found.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn settings() -> DiscoverySettings {
        DiscoverySettings::new(
            &["code/modules/unit_tests/**/*.dm".to_string()],
            Regex::new(r"^/datum/unit_test/([\w/]+)\s*$").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn finds_declarations_in_included_files_only() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "./code/modules/unit_tests/reagents.dm",
            "/datum/unit_test/reagent_recipes\n\tvar/x = 1\n\n/datum/unit_test/reagent_recipes/Run()\n",
        );
        fs.add_file(
            "./code/modules/unit_tests/mobs/spawn.dm",
            "/datum/unit_test/spawn_humans\n/datum/unit_test/reagent_recipes\n",
        );
        fs.add_file("./code/other.dm", "/datum/unit_test/not_included\n");

        let ids = discover_tests(&fs, Path::new("."), &settings()).unwrap();
        assert_eq!(
            ids,
            vec![TestId::new("reagent_recipes"), TestId::new("spawn_humans")]
        );
    }

    #[test]
    fn procs_on_tests_are_not_declarations() {
        let s = settings();
        let ids: Vec<_> = s.scan("/datum/unit_test/a/Run()\n/datum/unit_test/b\n").collect();
        assert_eq!(ids, vec![TestId::new("b")]);
    }

    #[test]
    fn invalid_glob_is_rejected() {
        let err = DiscoverySettings::new(&["[".to_string()], Regex::new("(x)").unwrap());
        assert!(err.is_err());
    }
}
