//! Launching jobs and merging through a stand-in execution engine.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use autospec::api::{ActionStatus, LaunchResult};
use autospec::config::Config;
use autospec::jobs::{BuildMode, BuildOptions, JobHandle, JobKind};
use autospec::phase_config::ThinkingTier;

use super::fixtures::{wait_for_file, TestProject};

/// An engine that records its arguments and working directory, then exits.
fn recording_engine(project: &TestProject) -> (PathBuf, PathBuf) {
    let record = project.temp_dir.path().join(".engine").join("args.txt");
    let body = format!(
        "{{ echo \"$*\"; pwd; }} > \"{0}.tmp\" && mv \"{0}.tmp\" \"{0}\"",
        record.display()
    );
    (project.engine_script("engine.sh", &body), record)
}

fn config_with_runner(runner: &Path) -> Config {
    Config {
        runner: Some(runner.display().to_string()),
        merge_timeout_secs: Some(1),
        ..Config::default()
    }
}

fn started(result: LaunchResult) -> autospec::api::JobStarted {
    match result {
        LaunchResult::Started(started) => started,
        LaunchResult::Failed(failed) => panic!("launch failed: {}", failed.message),
    }
}

#[test]
fn test_followup_runs_engine_detached() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    let (engine, record) = recording_engine(&project);
    let orchestrator = project.orchestrator_with(config_with_runner(&engine));

    let job = started(
        orchestrator
            .run_followup("001-auth", Some(project.project_dir()))
            .found()
            .expect("spec should be found"),
    );
    assert_eq!(job.status, ActionStatus::Started);
    assert_eq!(job.kind, JobKind::Followup);
    assert_eq!(job.message, "Follow-up planning started for 001-auth");
    assert!(job.pid > 0);

    assert!(wait_for_file(&record, Duration::from_secs(5)));
    let recorded = fs::read_to_string(&record).unwrap();
    let mut lines = recorded.lines();
    assert_eq!(
        lines.next().unwrap(),
        format!("--spec 001-auth --project-dir {} --followup", project.project_dir())
    );
    assert_eq!(
        PathBuf::from(lines.next().unwrap()).canonicalize().unwrap(),
        project.path.canonicalize().unwrap()
    );
}

#[test]
fn test_build_persists_job_handle() {
    let project = TestProject::new();
    let spec_dir = project.add_spec("001-auth");
    let (engine, record) = recording_engine(&project);
    let orchestrator = project.orchestrator_with(config_with_runner(&engine));

    let options = BuildOptions {
        mode: BuildMode::Direct,
        skip_qa: true,
        ..BuildOptions::default()
    };
    let job = started(
        orchestrator
            .run_build("001-auth", Some(project.project_dir()), options)
            .found()
            .expect("spec should be found"),
    );
    assert_eq!(job.kind, JobKind::Build);
    assert_eq!(job.mode, Some(BuildMode::Direct));
    assert_eq!(job.thinking, Some(ThinkingTier::Medium));
    assert!(job.model.as_deref().is_some_and(|m| !m.is_empty()));
    assert_eq!(job.message, "Build started for 001-auth in direct mode");

    let handle_path = spec_dir
        .join("jobs")
        .join(format!("build-{}.json", &job.job_id.simple().to_string()[..8]));
    let handle: JobHandle =
        serde_json::from_str(&fs::read_to_string(&handle_path).unwrap()).unwrap();
    assert_eq!(handle.id, job.job_id);
    assert_eq!(handle.pid, job.pid);
    assert_eq!(handle.command[0], engine.display().to_string());

    assert!(wait_for_file(&record, Duration::from_secs(5)));
    let args = fs::read_to_string(&record).unwrap();
    let args = args.lines().next().unwrap();
    assert!(args.contains("--auto-continue --direct --model "));
    assert!(args.contains("--thinking-level medium"));
    assert!(args.ends_with("--skip-qa"));
}

#[test]
fn test_qa_uses_qa_phase_thinking() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    let (engine, _record) = recording_engine(&project);
    let orchestrator = project.orchestrator_with(config_with_runner(&engine));

    let job = started(
        orchestrator
            .run_qa("001-auth", Some(project.project_dir()))
            .found()
            .expect("spec should be found"),
    );
    assert_eq!(job.kind, JobKind::Qa);
    assert_eq!(job.thinking, Some(ThinkingTier::High));
    assert!(job.mode.is_none());
    assert_eq!(job.message, "QA validation started for 001-auth");
}

#[test]
fn test_missing_engine_is_reported() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    let missing = project.temp_dir.path().join("no-such-engine");
    let orchestrator = project.orchestrator_with(config_with_runner(&missing));

    let value = serde_json::to_value(
        orchestrator
            .run_followup("001-auth", Some(project.project_dir()))
            .found()
            .expect("spec should be found"),
    )
    .unwrap();

    assert_eq!(value["status"], "error");
    assert_eq!(value["spec_id"], "001-auth");
    assert!(value["message"].as_str().unwrap().contains("no-such-engine"));
    assert!(!project.spec_dir("001-auth").join("jobs").exists());
}

#[tokio::test]
async fn test_merge_success_returns_output() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    let engine = project.engine_script("merge.sh", "echo \"merged $*\"");
    let orchestrator = project.orchestrator_with(config_with_runner(&engine));

    let result = orchestrator
        .merge_build("001-auth", Some(project.project_dir()), true)
        .await
        .found()
        .expect("spec should be found");

    assert_eq!(result.status, ActionStatus::Success);
    assert!(!result.timed_out);
    assert!(result.error.is_none());
    assert!(result.output.contains("--merge --no-commit"));
}

#[tokio::test]
async fn test_merge_failure_reports_stderr() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    let engine = project.engine_script("merge.sh", "echo 'conflict in src/lib.rs' >&2\nexit 3");
    let orchestrator = project.orchestrator_with(config_with_runner(&engine));

    let result = orchestrator
        .merge_build("001-auth", Some(project.project_dir()), false)
        .await
        .found()
        .expect("spec should be found");

    assert_eq!(result.status, ActionStatus::Error);
    assert!(!result.timed_out);
    assert_eq!(result.error.as_deref().map(str::trim), Some("conflict in src/lib.rs"));
}

#[tokio::test]
async fn test_merge_timeout_is_bounded() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    let engine = project.engine_script("merge.sh", "exec sleep 30");
    let orchestrator = project.orchestrator_with(config_with_runner(&engine));

    let start = std::time::Instant::now();
    let value = serde_json::to_value(
        orchestrator
            .merge_build("001-auth", Some(project.project_dir()), false)
            .await,
    )
    .unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(value["status"], "error");
    assert_eq!(value["timed_out"], true);
    assert_eq!(value["error"], "Merge timed out after 1s");
}

#[tokio::test]
async fn test_merge_unknown_spec() {
    let project = TestProject::new();
    let value = serde_json::to_value(
        project
            .orchestrator()
            .merge_build("001", Some(project.project_dir()), false)
            .await,
    )
    .unwrap();
    assert_eq!(value["found"], false);
}
