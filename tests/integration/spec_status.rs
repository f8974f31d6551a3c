//! Spec discovery and status derivation against on-disk spec directories.

use serde_json::json;

use autospec::status::SpecStatus;

use super::fixtures::TestProject;

#[test]
fn test_status_of_partially_built_spec() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    project.write_plan(
        "001-auth",
        &[&["complete", "complete"], &["in_progress", "pending"]],
    );
    project.write_spec_file(
        "001-auth",
        "review_state.json",
        r#"{"approved": true, "approved_by": "alice"}"#,
    );

    let orchestrator = project.orchestrator();
    let report = orchestrator
        .get_spec_status("001-auth", Some(project.project_dir()))
        .found()
        .expect("spec should be found");

    assert_eq!(report.status, SpecStatus::InProgress);
    assert!(report.approved);
    assert_eq!(report.approved_by.as_deref(), Some("alice"));
    assert_eq!(report.subtasks.completed, 2);
    assert_eq!(report.subtasks.in_progress, 1);
    assert_eq!(report.subtasks.pending, 1);
    assert_eq!(report.subtasks.total, 4);
    assert_eq!(report.phases.len(), 2);
    assert_eq!(report.phases[0].completed, 2);

    let current = report.current_subtask.expect("one subtask is in progress");
    assert_eq!(current.id.as_deref(), Some("2.1"));
    assert_eq!(current.attempts, 1);
    assert!(report.worktree_path.is_none());
}

#[test]
fn test_status_resolves_numeric_prefix() {
    let project = TestProject::new();
    project.add_spec("002-billing");
    project.write_plan("002-billing", &[&["complete"]]);

    let value = serde_json::to_value(
        project
            .orchestrator()
            .get_spec_status("002", Some(project.project_dir())),
    )
    .unwrap();

    assert_eq!(value["id"], "002-billing");
    assert_eq!(value["status"], "complete");
}

#[test]
fn test_unknown_spec_is_uniform_across_operations() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    let orchestrator = project.orchestrator();
    let dir = Some(project.project_dir());
    let expected = json!({"found": false, "error": "Spec '404' not found"});

    assert_eq!(
        serde_json::to_value(orchestrator.get_spec_status("404", dir)).unwrap(),
        expected
    );
    assert_eq!(
        serde_json::to_value(orchestrator.get_qa_status("404", dir)).unwrap(),
        expected
    );
    assert_eq!(
        serde_json::to_value(orchestrator.review_build("404", dir)).unwrap(),
        expected
    );
    assert_eq!(
        serde_json::to_value(orchestrator.merge_preview("404", dir)).unwrap(),
        expected
    );
}

#[test]
fn test_list_specs_counts_and_is_stable() {
    let project = TestProject::new();
    project.add_spec("001-done");
    project.write_plan("001-done", &[&["complete"]]);
    project.write_spec_file("001-done", "qa_report.md", "# QA\n\nAll checks passed\n");
    project.add_spec("002-active");
    project.write_plan("002-active", &[&["complete", "in_progress"]]);
    project.add_spec("003-new");
    project.add_spec("004-broken");
    project.write_spec_file("004-broken", "implementation_plan.json", "{ not json");

    let orchestrator = project.orchestrator();
    let first = orchestrator.list_specs(Some(project.project_dir()));

    let ids: Vec<&str> = first.specs.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["001-done", "002-active", "003-new", "004-broken"]);
    assert_eq!(first.specs[0].status, SpecStatus::QaComplete);
    assert_eq!(first.specs[1].status, SpecStatus::InProgress);
    assert_eq!(first.specs[2].status, SpecStatus::Pending);
    assert_eq!(first.specs[3].status, SpecStatus::Pending);
    assert_eq!(first.total, 4);
    assert_eq!(first.complete, 1);
    assert_eq!(first.in_progress, 1);
    assert_eq!(first.pending, 2);

    let second = orchestrator.list_specs(Some(project.project_dir()));
    assert_eq!(first, second);
}

#[test]
fn test_list_specs_without_state_dir() {
    let project = TestProject::new();
    let list = project.orchestrator().list_specs(Some(project.project_dir()));
    assert_eq!(list.total, 0);
    assert!(list.specs.is_empty());
}

#[test]
fn test_qa_state_wins_over_report() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    project.write_spec_file(
        "001-auth",
        "qa_state.json",
        r#"{"passed": false, "issues": [{"title": "flaky test"}], "last_run": "2026-01-02T03:04:05Z"}"#,
    );
    project.write_spec_file("001-auth", "qa_report.md", "All checks passed ✅");

    let qa = project
        .orchestrator()
        .get_qa_status("001-auth", Some(project.project_dir()))
        .found()
        .expect("spec should be found")
        .qa;

    assert!(qa.qa_run);
    assert!(!qa.passed);
    assert_eq!(qa.issues, vec![json!({"title": "flaky test"})]);
    assert_eq!(qa.last_run, Some(json!("2026-01-02T03:04:05Z")));
}

#[test]
fn test_qa_report_fallback() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    project.write_spec_file("001-auth", "qa_report.md", "Result: PASSED\n");

    let qa = project
        .orchestrator()
        .get_qa_status("001-auth", Some(project.project_dir()))
        .found()
        .expect("spec should be found")
        .qa;

    assert!(qa.qa_run);
    assert!(qa.passed);
    assert!(qa.issues.is_empty());
    assert!(qa.last_run.is_some());
}

#[test]
fn test_qa_never_run() {
    let project = TestProject::new();
    project.add_spec("001-auth");

    let value = serde_json::to_value(
        project
            .orchestrator()
            .get_qa_status("001-auth", Some(project.project_dir())),
    )
    .unwrap();

    assert_eq!(value["qa_run"], false);
    assert_eq!(value["passed"], false);
    assert_eq!(value["last_run"], serde_json::Value::Null);
}
