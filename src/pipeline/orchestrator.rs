// src/pipeline/orchestrator.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::artifacts::{
    focus_lines, remove_best_effort, resolve_project_name, write_artifacts, ArtifactPaths,
    ArtifactRequest,
};
use crate::config::ConfigFile;
use crate::errors::{PipelineError, Result};
use crate::exec::{run_process, DaemonInvocation, DaemonManager, ProcessSpec, ProcessTable};
use crate::fs::FileSystem;
use crate::pipeline::{RunReport, Verdict};
use crate::results::{read_results, ReconciledOutcome};
use crate::types::{RequestedTestSet, ResultsFormat, TestId};

/// Everything a run will touch, resolved before any stage starts.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub paths: ArtifactPaths,
    pub pre_build: Vec<ProcessSpec>,
    pub compiler: ProcessSpec,
    pub daemon: DaemonInvocation,
    pub results_path: PathBuf,
    pub results_format: ResultsFormat,
}

impl RunPlan {
    /// Files removed before launch so a previous run's output cannot be
    /// mistaken for this run's.
    pub fn stale_outputs(&self) -> Vec<PathBuf> {
        vec![
            self.daemon.log_dir.join(&self.daemon.log_file),
            self.results_path.clone(),
        ]
    }
}

/// Runs the compile / launch / reconcile pipeline for one workspace.
///
/// Runs in the same workspace must be serialized by the caller: the
/// generated files are owned by whichever run is in progress.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: ConfigFile,
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    daemon: DaemonManager,
}

impl Pipeline {
    pub fn new(
        config: ConfigFile,
        root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        table: Arc<dyn ProcessTable>,
    ) -> Self {
        Self {
            config,
            root: root.into(),
            fs,
            daemon: DaemonManager::new(table),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Resolve artifact names and command lines without side effects.
    pub fn plan(&self) -> Result<RunPlan> {
        let name = resolve_project_name(
            self.fs.as_ref(),
            &self.root,
            self.config.project().name.as_deref(),
        )?;
        let paths = ArtifactPaths::new(&self.root, name);

        let pre_build = self
            .config
            .project()
            .pre_build
            .iter()
            .map(|cmd| ProcessSpec::shell(cmd).in_dir(&self.root))
            .collect();

        let compiler = ProcessSpec::new(
            &self.config.compiler().path,
            vec![paths.patched_descriptor().to_string_lossy().into_owned()],
        )
        .in_dir(&self.root);

        let daemon_cfg = self.config.daemon();
        let mut args = vec![paths.compiled_binary().to_string_lossy().into_owned()];
        args.extend(daemon_cfg.args.iter().cloned());

        let daemon = DaemonInvocation {
            executable: PathBuf::from(&daemon_cfg.path),
            args,
            cwd: self.root.clone(),
            log_dir: self.config.log_dir(&self.root),
            log_file: daemon_cfg.log_file.clone(),
            finished_pattern: self.config.finished_pattern().clone(),
            timeout: self.config.daemon_timeout(),
        };

        Ok(RunPlan {
            paths,
            pre_build,
            compiler,
            daemon,
            results_path: self.root.join(self.config.results_path()),
            results_format: self.config.results_format(),
        })
    }

    /// Run every stage in order and reconcile the results.
    ///
    /// Generated files are removed on every exit path, including errors and
    /// cancellation.
    pub async fn execute(
        &self,
        requested: &RequestedTestSet,
        cancel: &CancellationToken,
    ) -> Result<ReconciledOutcome> {
        let plan = self.plan()?;

        let result = self
            .stages(&plan, requested, cancel)
            .instrument(info_span!("run", project = plan.paths.base_name()))
            .await;

        let report = remove_best_effort(self.fs.as_ref(), &plan.paths.ephemeral_files());
        debug!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            "cleaned up generated files"
        );

        match &result {
            Ok(outcome) => info!(tests = outcome.len(), "run finished"),
            Err(PipelineError::Cancelled) => info!("run cancelled"),
            Err(e) => warn!(kind = ?e.kind(), error = %e, "run failed"),
        }
        result
    }

    /// Like [`execute`](Self::execute), but always yields a verdict for
    /// every requested test.
    pub async fn run(&self, requested: &RequestedTestSet, cancel: &CancellationToken) -> RunReport {
        let type_paths: BTreeMap<TestId, String> = requested
            .iter()
            .map(|id| (id.clone(), id.type_path()))
            .collect();

        match self.execute(requested, cancel).await {
            Ok(outcome) => RunReport::from_outcome(&outcome, type_paths),
            Err(e) => {
                let verdict = if e.is_cancelled() {
                    Verdict::Skipped
                } else {
                    Verdict::Errored {
                        message: e.to_string(),
                    }
                };
                RunReport::from_error(e, verdict, type_paths)
            }
        }
    }

    async fn stages(
        &self,
        plan: &RunPlan,
        requested: &RequestedTestSet,
        cancel: &CancellationToken,
    ) -> Result<ReconciledOutcome> {
        self.pre_build(plan, cancel).await?;

        ensure_not_cancelled(cancel)?;
        let project = self.config.project();
        write_artifacts(
            self.fs.as_ref(),
            ArtifactRequest {
                paths: &plan.paths,
                defines: &project.defines,
                focus_template: &project.focus_template,
                tests: requested,
            },
        )?;

        self.compile(plan, cancel).await?;

        self.clear_stale_outputs(plan);
        info!(stage = "daemon", "running tests");
        self.daemon.run_daemon(&plan.daemon, cancel).await?;

        ensure_not_cancelled(cancel)?;
        read_results(
            self.fs.as_ref(),
            &plan.results_path,
            plan.results_format,
            requested,
        )
    }

    async fn pre_build(&self, plan: &RunPlan, cancel: &CancellationToken) -> Result<()> {
        for (idx, spec) in plan.pre_build.iter().enumerate() {
            info!(stage = "pre-build", step = idx + 1, "running pre-build command");
            let output = run_process(spec, cancel).await?;
            if !output.success {
                return Err(PipelineError::run_with_output(
                    format!(
                        "pre-build command {} failed (exit code {:?})",
                        idx + 1,
                        output.exit_code
                    ),
                    output.text,
                ));
            }
        }
        Ok(())
    }

    async fn compile(&self, plan: &RunPlan, cancel: &CancellationToken) -> Result<()> {
        info!(
            stage = "compile",
            compiler = %plan.compiler.program.display(),
            descriptor = %plan.paths.patched_descriptor().display(),
            "compiling"
        );
        let output = run_process(&plan.compiler, cancel).await?;

        let marker = plan.paths.compile_success_marker();
        if output.text.contains(&marker) {
            info!(stage = "compile", "compiled cleanly");
            Ok(())
        } else {
            Err(PipelineError::run_with_output(
                format!("compilation failed: '{marker}' not found in compiler output"),
                output.text,
            ))
        }
    }

    fn clear_stale_outputs(&self, plan: &RunPlan) {
        let report = remove_best_effort(self.fs.as_ref(), &plan.stale_outputs());
        for path in &report.removed {
            debug!(path = %path.display(), "removed stale output");
        }
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Human-readable plan, printed by `--dry-run`.
pub fn describe_plan(plan: &RunPlan, config: &ConfigFile, requested: &RequestedTestSet) -> String {
    let mut out = String::new();
    out.push_str("dmtest dry-run\n");
    out.push_str(&format!(
        "  descriptor: {} -> {}\n",
        plan.paths.original_descriptor().display(),
        plan.paths.patched_descriptor().display()
    ));
    for (idx, spec) in plan.pre_build.iter().enumerate() {
        out.push_str(&format!("  pre-build {}: {}\n", idx + 1, spec.command_line()));
    }
    out.push_str(&format!("  compile: {}\n", plan.compiler.command_line()));
    out.push_str(&format!(
        "  daemon: {} {} -params test-id=<token>\n",
        plan.daemon.executable.display(),
        plan.daemon.args.join(" ")
    ));
    out.push_str(&format!(
        "  completion: /{}/ in {}\n",
        plan.daemon.finished_pattern.as_str(),
        plan.daemon.log_dir.join(&plan.daemon.log_file).display()
    ));
    out.push_str(&format!(
        "  results: {} ({:?})\n",
        plan.results_path.display(),
        plan.results_format
    ));

    let defines = &config.project().defines;
    if !defines.is_empty() {
        out.push_str(&format!("\ndefines ({}):\n", defines.len()));
        for d in defines {
            out.push_str(&format!("  {d}\n"));
        }
    }

    out.push_str(&format!("\nfocus lines ({}):\n", requested.len()));
    for line in focus_lines(&config.project().focus_template, requested).lines() {
        out.push_str(&format!("  {line}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfigFile;
    use crate::exec::ProcessEntry;
    use crate::fs::mock::MockFileSystem;

    #[derive(Debug)]
    struct EmptyTable;

    impl ProcessTable for EmptyTable {
        fn snapshot(&self) -> Vec<ProcessEntry> {
            Vec::new()
        }

        fn kill(&self, _pid: u32) -> bool {
            false
        }
    }

    fn pipeline(fs: &MockFileSystem, raw: RawConfigFile) -> Pipeline {
        let config = ConfigFile::try_from(raw).unwrap();
        Pipeline::new(config, ".", Arc::new(fs.clone()), Arc::new(EmptyTable))
    }

    #[test]
    fn plan_resolves_names_and_command_lines() {
        let fs = MockFileSystem::new();
        fs.add_file("./tgstation.dme", "");
        let p = pipeline(&fs, RawConfigFile::default());

        let plan = p.plan().unwrap();
        assert_eq!(plan.paths.base_name(), "tgstation");
        assert_eq!(plan.compiler.args, vec!["./tgstation.test.dme".to_string()]);
        assert_eq!(plan.daemon.args[0], "./tgstation.test.dmb");
        assert_eq!(&plan.daemon.args[1..], ["-close", "-trusted", "-verbose", "-invisible"]);
        assert_eq!(plan.results_path, PathBuf::from("./data/unit_tests.json"));
        assert_eq!(
            plan.stale_outputs(),
            vec![
                PathBuf::from("./data/logs/ci/game.log"),
                PathBuf::from("./data/unit_tests.json")
            ]
        );
    }

    #[tokio::test]
    async fn failed_setup_still_cleans_up_and_marks_tests_errored() {
        let fs = MockFileSystem::new();
        fs.add_file("./tgstation.dme", "");
        let mut raw = RawConfigFile::default();
        raw.compiler.path = "./definitely-not-a-compiler-binary".to_string();
        let p = pipeline(&fs, raw);

        let requested: RequestedTestSet = [TestId::new("a")].into_iter().collect();
        let report = p.run(&requested, &CancellationToken::new()).await;

        assert!(matches!(report.error, Some(PipelineError::ConfigError(_))));
        assert!(matches!(
            report.verdict(&TestId::new("a")),
            Some(Verdict::Errored { .. })
        ));
        assert_eq!(fs.file_paths(), vec![PathBuf::from("./tgstation.dme")]);
    }

    #[tokio::test]
    async fn cancellation_before_start_skips_everything() {
        let fs = MockFileSystem::new();
        fs.add_file("./tgstation.dme", "");
        let p = pipeline(&fs, RawConfigFile::default());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let requested: RequestedTestSet = [TestId::new("a")].into_iter().collect();
        let report = p.run(&requested, &cancel).await;

        assert!(matches!(report.error, Some(PipelineError::Cancelled)));
        assert_eq!(report.verdict(&TestId::new("a")), Some(&Verdict::Skipped));
        assert_eq!(fs.file_paths(), vec![PathBuf::from("./tgstation.dme")]);
    }
}
