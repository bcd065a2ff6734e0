#![allow(dead_code)]

use dmtest::config::{ConfigFile, RawConfigFile};
use dmtest::errors::PipelineError;
use dmtest::types::ResultsFormat;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the built-in defaults, the same values a workspace without a
/// `Dmtest.toml` would get.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn project_name(mut self, name: &str) -> Self {
        self.config.project.name = Some(name.to_string());
        self
    }

    pub fn define(mut self, line: &str) -> Self {
        self.config.project.defines.push(line.to_string());
        self
    }

    pub fn focus_template(mut self, template: &str) -> Self {
        self.config.project.focus_template = template.to_string();
        self
    }

    pub fn pre_build(mut self, cmd: &str) -> Self {
        self.config.project.pre_build.push(cmd.to_string());
        self
    }

    pub fn compiler(mut self, path: &str) -> Self {
        self.config.compiler.path = path.to_string();
        self
    }

    pub fn daemon(mut self, path: &str) -> Self {
        self.config.daemon.path = path.to_string();
        self
    }

    pub fn daemon_args(mut self, args: &[&str]) -> Self {
        self.config.daemon.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn log_location(mut self, dir: &str, file: &str) -> Self {
        self.config.daemon.log_dir = dir.to_string();
        self.config.daemon.log_file = file.to_string();
        self
    }

    pub fn finished_pattern(mut self, pattern: &str) -> Self {
        self.config.daemon.finished_pattern = pattern.to_string();
        self
    }

    pub fn daemon_timeout(mut self, timeout: &str) -> Self {
        self.config.daemon.timeout = Some(timeout.to_string());
        self
    }

    pub fn results(mut self, format: ResultsFormat, path: Option<&str>) -> Self {
        self.config.results.format = format;
        self.config.results.path = path.map(str::to_string);
        self
    }

    pub fn raw(&self) -> &RawConfigFile {
        &self.config
    }

    pub fn try_build(self) -> Result<ConfigFile, PipelineError> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
