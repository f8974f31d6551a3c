//! Worktree lifecycle against real git repositories.

use serde_json::json;

use super::fixtures::{git, TestProject};

#[test]
fn test_list_worktrees_reports_branches() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    project.add_spec("002-billing");
    let auth = project.add_worktree("001-auth");
    project.add_worktree("002-billing");

    let list = project.orchestrator().list_worktrees(Some(project.project_dir()));

    assert_eq!(list.total, 2);
    assert_eq!(list.worktrees[0].spec_id, "001-auth");
    assert_eq!(list.worktrees[0].path, auth.display().to_string());
    assert_eq!(list.worktrees[0].branch.as_deref(), Some("auto-claude/001-auth"));
    assert!(list.worktrees[0].branch_error.is_none());
    assert_eq!(list.worktrees[1].branch.as_deref(), Some("auto-claude/002-billing"));
}

#[test]
fn test_list_worktrees_without_root() {
    let project = TestProject::new();
    let list = project.orchestrator().list_worktrees(Some(project.project_dir()));
    assert_eq!(list.total, 0);
}

#[test]
fn test_status_reports_worktree_path() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    let worktree = project.add_worktree("001-auth");

    let report = project
        .orchestrator()
        .get_spec_status("001-auth", Some(project.project_dir()))
        .found()
        .expect("spec should be found");

    assert_eq!(report.worktree_path, Some(worktree.display().to_string()));

    let list = project.orchestrator().list_specs(Some(project.project_dir()));
    assert!(list.specs[0].worktree);
}

#[test]
fn test_review_build_shows_recent_work() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    let worktree = project.add_worktree("001-auth");
    project.commit_in(&worktree, "src/auth.rs", "pub fn login() {}\n", "Add auth module");

    let report = project
        .orchestrator()
        .review_build("001-auth", Some(project.project_dir()))
        .found()
        .expect("spec should be found");

    assert!(report.has_worktree);
    assert!(report.inspection.files_changed.contains(&"src/auth.rs".to_string()));
    assert_eq!(report.inspection.commits.len(), 2);
    assert!(report.inspection.commits[0].ends_with(" Add auth module"));
}

#[test]
fn test_review_build_without_worktree() {
    let project = TestProject::new();
    project.add_spec("001-auth");

    let value = serde_json::to_value(
        project
            .orchestrator()
            .review_build("001-auth", Some(project.project_dir())),
    )
    .unwrap();

    assert_eq!(value["has_worktree"], false);
    assert_eq!(value["files_changed"], json!([]));
    assert_eq!(value["commits"], json!([]));
}

#[test]
fn test_merge_preview_clean() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    let worktree = project.add_worktree("001-auth");
    project.commit_in(&worktree, "auth.txt", "auth\n", "Add auth");

    let preview = project
        .orchestrator()
        .merge_preview("001-auth", Some(project.project_dir()))
        .found()
        .expect("spec should be found")
        .preview;

    assert!(preview.has_worktree);
    assert!(preview.can_merge);
    assert_eq!(preview.branch.as_deref(), Some("auto-claude/001-auth"));
    assert!(preview.conflicts.is_empty());
    assert_eq!(preview.files_to_merge, vec!["auth.txt".to_string()]);
}

#[test]
fn test_merge_preview_detects_conflicts() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    let worktree = project.add_worktree("001-auth");
    project.commit_in(&worktree, "shared.txt", "branch version\n", "Branch edit");
    let root = project.path.clone();
    project.commit_in(&root, "shared.txt", "trunk version\n", "Trunk edit");

    let preview = project
        .orchestrator()
        .merge_preview("001-auth", Some(project.project_dir()))
        .found()
        .expect("spec should be found")
        .preview;

    assert!(preview.has_worktree);
    assert!(!preview.can_merge);
    assert_eq!(
        preview.conflicts,
        vec!["CONFLICT (content): Merge conflict in shared.txt".to_string()]
    );

    // The check is in memory; nothing on disk moved.
    assert_eq!(git(&root, &["rev-parse", "--abbrev-ref", "HEAD"]), "main");
    assert_eq!(git(&root, &["status", "--porcelain"]), "");
}

#[test]
fn test_merge_preview_without_worktree() {
    let project = TestProject::new();
    project.add_spec("001-auth");

    let value = serde_json::to_value(
        project
            .orchestrator()
            .merge_preview("001-auth", Some(project.project_dir())),
    )
    .unwrap();

    assert_eq!(value["has_worktree"], false);
    assert_eq!(value["can_merge"], false);
    assert_eq!(value["message"], "No worktree found for this spec");
}

#[test]
fn test_discard_requires_confirmation() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    let worktree = project.add_worktree("001-auth");

    let value = serde_json::to_value(project.orchestrator().discard_build(
        "001-auth",
        Some(project.project_dir()),
        false,
    ))
    .unwrap();

    assert_eq!(value["status"], "blocked");
    assert!(worktree.is_dir());
    assert!(project.branch_exists("auto-claude/001-auth"));
}

#[test]
fn test_discard_removes_worktree_and_branch() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    let worktree = project.add_worktree("001-auth");
    project.commit_in(&worktree, "auth.txt", "auth\n", "Add auth");

    let value = serde_json::to_value(project.orchestrator().discard_build(
        "001-auth",
        Some(project.project_dir()),
        true,
    ))
    .unwrap();

    assert_eq!(value["status"], "success");
    assert_eq!(value["message"], "Build discarded for 001-auth");
    assert_eq!(value["worktree_removed"], true);
    assert_eq!(value["branch_deleted"], true);
    assert_eq!(value["branch"], "auto-claude/001-auth");
    assert!(!worktree.exists());
    assert!(!project.branch_exists("auto-claude/001-auth"));

    // A second discard finds nothing left.
    let again = serde_json::to_value(project.orchestrator().discard_build(
        "001-auth",
        Some(project.project_dir()),
        true,
    ))
    .unwrap();
    assert_eq!(again["status"], "error");
    assert_eq!(again["message"], "No worktree found to discard");
}

#[test]
fn test_cleanup_removes_every_worktree() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    project.add_spec("002-billing");
    project.add_worktree("001-auth");
    project.add_worktree("002-billing");
    let orchestrator = project.orchestrator();

    let blocked =
        serde_json::to_value(orchestrator.cleanup_worktrees(Some(project.project_dir()), false))
            .unwrap();
    assert_eq!(blocked["status"], "blocked");
    assert_eq!(orchestrator.list_worktrees(Some(project.project_dir())).total, 2);

    let value =
        serde_json::to_value(orchestrator.cleanup_worktrees(Some(project.project_dir()), true))
            .unwrap();
    assert_eq!(value["status"], "success");
    assert_eq!(value["removed"], json!(["001-auth", "002-billing"]));
    assert_eq!(value["removed_count"], 2);
    assert!(value.get("errors").is_none());

    assert_eq!(orchestrator.list_worktrees(Some(project.project_dir())).total, 0);
    assert!(!project.branch_exists("auto-claude/001-auth"));
    assert!(!project.branch_exists("auto-claude/002-billing"));
    let registered = git(&project.path, &["worktree", "list", "--porcelain"]);
    assert_eq!(registered.matches("worktree ").count(), 1);
}
