#![cfg(unix)]

mod common;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::*;
use dmtest::errors::PipelineError;
use dmtest::fs::RealFileSystem;
use dmtest::pipeline::{Pipeline, Verdict};
use dmtest::types::{RequestedTestSet, ResultsFormat, TestId};
use dmtest_test_utils::FakeProcessTable;

type TestResult = Result<(), Box<dyn Error>>;

const LIMIT: Duration = Duration::from_secs(20);

fn requested(ids: &[&str]) -> RequestedTestSet {
    ids.iter().map(|s| TestId::new(*s)).collect()
}

fn pipeline(ws: &Workspace, cfg: ConfigFileBuilder) -> Pipeline {
    Pipeline::new(
        cfg.build(),
        ws.root(),
        Arc::new(RealFileSystem),
        Arc::new(FakeProcessTable::new()),
    )
}

#[tokio::test]
async fn structured_results_are_reconciled_and_artifacts_removed() -> TestResult {
    init_tracing();
    let ws = Workspace::new(
        OK_COMPILER,
        &structured_daemon(
            r#"{
  "/datum/unit_test/a": {"status": 0, "message": "", "name": "A"},
  "/datum/unit_test/b": {"status": 1, "message": "x", "name": "B"},
  "/datum/unit_test/unrelated": {"status": 1, "message": "", "name": "U"}
}"#,
        ),
    );
    let p = pipeline(&ws, ws.config());

    let outcome = with_timeout_of(
        LIMIT,
        p.execute(&requested(&["a", "b", "c"]), &CancellationToken::new()),
    )
    .await?;

    assert_eq!(outcome.passed.len(), 1);
    assert_eq!(outcome.passed[0].id, TestId::new("a"));
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].message.as_deref(), Some("x"));
    assert!(outcome.skipped.is_empty());
    assert_eq!(outcome.ignored, vec![TestId::new("c")]);
    assert!(outcome.is_partition_of(&requested(&["a", "b", "c"])));

    // What the compiler saw.
    let dme = ws.read("dme_seen.txt");
    assert!(dme.starts_with("#define CIBUILDING\n"));
    assert!(dme.contains(ORIGINAL_DME));
    assert!(dme.ends_with("#include \"tgstation.test_focus.dm\"\n"));
    assert_eq!(
        ws.read("focus_seen.txt"),
        "TEST_FOCUS(/datum/unit_test/a)\nTEST_FOCUS(/datum/unit_test/b)\nTEST_FOCUS(/datum/unit_test/c)\n"
    );

    // What the daemon was started with.
    let args = ws.daemon_args();
    assert!(args[0].ends_with("tgstation.test.dmb"));
    assert_eq!(args[args.len() - 2], "-params");
    assert!(args[args.len() - 1].starts_with("test-id="));

    assert!(ws.leftover_generated_files().is_empty());
    assert_eq!(ws.read("tgstation.dme"), ORIGINAL_DME);
    Ok(())
}

#[tokio::test]
async fn line_log_results_are_supported() -> TestResult {
    init_tracing();
    let daemon = daemon_script(
        r#"mkdir -p data/logs/ci
printf '[10:00] PASS: /datum/unit_test/a\n[10:01] FAIL: /datum/unit_test/b\n - \treason\n[10:02] done\n' > data/logs/ci/unit_tests.log
echo "Rebooting" > data/logs/ci/game.log
"#,
    );
    let ws = Workspace::new(OK_COMPILER, &daemon);
    let p = pipeline(&ws, ws.config().results(ResultsFormat::LineLog, None));

    let outcome = with_timeout_of(
        LIMIT,
        p.execute(&requested(&["a", "b"]), &CancellationToken::new()),
    )
    .await?;

    assert_eq!(outcome.passed[0].id, TestId::new("a"));
    assert_eq!(outcome.failed[0].id, TestId::new("b"));
    assert_eq!(outcome.failed[0].message.as_deref(), Some("reason"));
    Ok(())
}

#[tokio::test]
async fn empty_request_still_compiles_and_runs_the_daemon() -> TestResult {
    init_tracing();
    let ws = Workspace::new(OK_COMPILER, &structured_daemon("{}"));
    let p = pipeline(&ws, ws.config());

    let outcome = with_timeout_of(
        LIMIT,
        p.execute(&RequestedTestSet::new(), &CancellationToken::new()),
    )
    .await?;

    assert!(outcome.is_empty());
    assert!(outcome.is_partition_of(&RequestedTestSet::new()));
    assert!(ws.exists("dme_seen.txt"));
    assert!(ws.exists("daemon_args.txt"));
    Ok(())
}

#[tokio::test]
async fn compile_failure_is_a_run_error_with_output() -> TestResult {
    init_tracing();
    let ws = Workspace::new(FAILING_COMPILER, &structured_daemon("{}"));
    let p = pipeline(&ws, ws.config());

    let report = with_timeout_of(
        LIMIT,
        p.run(&requested(&["a"]), &CancellationToken::new()),
    )
    .await;

    let err = report.error.as_ref().ok_or("expected an error")?;
    assert!(matches!(err, PipelineError::RunError { .. }));
    assert!(err.output().unwrap_or_default().contains("undefined var"));
    assert!(matches!(
        report.verdict(&TestId::new("a")),
        Some(Verdict::Errored { .. })
    ));
    assert_eq!(report.exit_code(), 1);

    assert!(!ws.exists("daemon_args.txt"), "daemon must not start");
    assert!(ws.leftover_generated_files().is_empty());
    Ok(())
}

#[tokio::test]
async fn failing_pre_build_stops_before_patching() -> TestResult {
    init_tracing();
    let ws = Workspace::new(OK_COMPILER, &structured_daemon("{}"));
    let p = pipeline(
        &ws,
        ws.config()
            .pre_build("echo prebuilt > prebuild.txt")
            .pre_build("echo tgui build failed; exit 4"),
    );

    let err = with_timeout_of(LIMIT, p.execute(&requested(&["a"]), &CancellationToken::new()))
        .await
        .err()
        .ok_or("expected an error")?;

    assert!(matches!(err, PipelineError::RunError { .. }));
    assert!(err.output().unwrap_or_default().contains("tgui build failed"));
    assert!(ws.exists("prebuild.txt"));
    assert!(!ws.exists("dme_seen.txt"), "compiler must not run");
    assert!(ws.leftover_generated_files().is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_results_artifact_is_a_config_error() -> TestResult {
    init_tracing();
    let daemon = daemon_script(
        r#"mkdir -p data/logs/ci
echo "Round ended" > data/logs/ci/game.log
"#,
    );
    let ws = Workspace::new(OK_COMPILER, &daemon);
    // A results file left over from an earlier run must not be picked up.
    ws.write("data/unit_tests.json", r#"{"/datum/unit_test/a": {"status": 0}}"#);
    let p = pipeline(&ws, ws.config());

    let err = with_timeout_of(LIMIT, p.execute(&requested(&["a"]), &CancellationToken::new()))
        .await
        .err()
        .ok_or("expected an error")?;

    assert!(matches!(err, PipelineError::ConfigError(_)), "{err:?}");
    assert!(ws.leftover_generated_files().is_empty());
    Ok(())
}

#[tokio::test]
async fn stale_log_marker_does_not_end_the_run_early() -> TestResult {
    init_tracing();
    let ws = Workspace::new(
        OK_COMPILER,
        &structured_daemon(r#"{"/datum/unit_test/a": {"status": 0}}"#),
    );
    ws.write("data/logs/ci/game.log", "Round ended\n");
    let p = pipeline(&ws, ws.config());

    let outcome = with_timeout_of(LIMIT, p.execute(&requested(&["a"]), &CancellationToken::new()))
        .await?;

    assert_eq!(outcome.passed.len(), 1);
    Ok(())
}

#[tokio::test]
async fn daemon_timeout_is_a_run_error() -> TestResult {
    init_tracing();
    let ws = Workspace::new(OK_COMPILER, &daemon_script("sleep 2"));
    let p = pipeline(&ws, ws.config().daemon_timeout("300ms"));

    let err = with_timeout_of(LIMIT, p.execute(&requested(&["a"]), &CancellationToken::new()))
        .await
        .err()
        .ok_or("expected an error")?;

    assert!(matches!(err, PipelineError::RunError { .. }), "{err:?}");
    assert!(ws.leftover_generated_files().is_empty());
    Ok(())
}
