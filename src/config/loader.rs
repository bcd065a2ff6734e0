// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{PipelineError, Result};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        PipelineError::ConfigError(format!("reading config file {}: {e}", path.display()))
    })?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// A missing file at the *default* location is not an error: every section
/// has defaults, so an unconfigured workspace still gets a usable config.
/// An explicitly requested path that does not exist is a `ConfigError`.
pub fn load_and_validate(path: impl AsRef<Path>, explicit: bool) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file found; using defaults");
        RawConfigFile::default()
    } else {
        load_from_path(path)?
    };
    ConfigFile::try_from(raw_config)
}

/// Default config file location inside a workspace.
pub fn default_config_path(workspace: &Path) -> PathBuf {
    workspace.join("Dmtest.toml")
}
