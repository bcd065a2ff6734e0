// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Every stage of the pipeline reports failures as a [`PipelineError`]. The
//! four variants are the only kinds the orchestrator distinguishes:
//!
//! - `UserError`: the caller's environment is unusable (e.g. no workspace).
//! - `ConfigError`: resolved configuration is absent, malformed, or points at
//!   something that does not exist (including a missing results artifact).
//! - `RunError`: an external tool failed on its own terms; carries whatever
//!   output was captured.
//! - `Cancelled`: the run was cooperatively cancelled. Not shown to the user
//!   as an error.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("User error: {0}")]
    UserError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Run error: {message}")]
    RunError { message: String, output: String },

    #[error("run cancelled")]
    Cancelled,
}

/// Tag of a [`PipelineError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    User,
    Config,
    Run,
    Cancel,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::UserError(_) => ErrorKind::User,
            PipelineError::ConfigError(_) => ErrorKind::Config,
            PipelineError::RunError { .. } => ErrorKind::Run,
            PipelineError::Cancelled => ErrorKind::Cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }

    /// A `RunError` with no captured output.
    pub fn run(message: impl Into<String>) -> Self {
        PipelineError::RunError {
            message: message.into(),
            output: String::new(),
        }
    }

    /// A `RunError` carrying captured process output.
    pub fn run_with_output(message: impl Into<String>, output: impl Into<String>) -> Self {
        PipelineError::RunError {
            message: message.into(),
            output: output.into(),
        }
    }

    /// Captured diagnostic output, if this is a `RunError` that has any.
    pub fn output(&self) -> Option<&str> {
        match self {
            PipelineError::RunError { output, .. } if !output.is_empty() => Some(output),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for PipelineError {
    fn from(err: toml::de::Error) -> Self {
        PipelineError::ConfigError(format!("TOML parsing error: {err}"))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipelineError>;
