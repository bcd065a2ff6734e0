// src/config/mod.rs

//! Configuration loading and validation for dmtest.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate paths, regexes, the focus template and durations (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    CompilerSection, ConfigFile, DaemonSection, DiscoverySection, ProjectSection, RawConfigFile,
    ResultsSection, FOCUS_PLACEHOLDER,
};
pub use validate::{parse_duration, validate_focus_template};
