//! JSON tool dispatch over a real project.

use serde_json::json;

use super::fixtures::TestProject;

#[tokio::test]
async fn test_status_tools_end_to_end() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    project.write_plan("001-auth", &[&["complete", "in_progress"]]);
    let orchestrator = project.orchestrator();
    let dir = project.project_dir();

    let list = orchestrator
        .call_tool("list_specs", json!({"project_dir": dir}))
        .await;
    assert_eq!(list["total"], 1);
    assert_eq!(list["in_progress"], 1);
    assert_eq!(list["specs"][0]["id"], "001-auth");
    assert_eq!(list["specs"][0]["subtasks"], json!({"completed": 1, "total": 2}));

    let status = orchestrator
        .call_tool("get_spec_status", json!({"spec_id": "001", "project_dir": dir}))
        .await;
    assert_eq!(status["found"], true);
    assert_eq!(status["status"], "in_progress");
    assert_eq!(status["current_subtask"]["id"], "1.2");
    assert_eq!(status["phases"][0]["status"], "in_progress");

    let missing = orchestrator
        .call_tool("get_qa_status", json!({"spec_id": "999", "project_dir": dir}))
        .await;
    assert_eq!(missing, json!({"found": false, "error": "Spec '999' not found"}));
}

#[tokio::test]
async fn test_worktree_tools_end_to_end() {
    let project = TestProject::new();
    project.add_spec("001-auth");
    let worktree = project.add_worktree("001-auth");
    project.commit_in(&worktree, "auth.txt", "auth\n", "Add auth");
    let orchestrator = project.orchestrator();
    let dir = project.project_dir();

    let preview = orchestrator
        .call_tool("merge_preview", json!({"spec_id": "001-auth", "project_dir": dir}))
        .await;
    assert_eq!(preview["can_merge"], true);
    assert_eq!(preview["files_to_merge"], json!(["auth.txt"]));

    let blocked = orchestrator
        .call_tool("discard_build", json!({"spec_id": "001-auth", "project_dir": dir}))
        .await;
    assert_eq!(blocked["status"], "blocked");
    assert!(worktree.is_dir());

    let cleaned = orchestrator
        .call_tool("cleanup_worktrees", json!({"project_dir": dir, "confirm": true}))
        .await;
    assert_eq!(cleaned["status"], "success");
    assert_eq!(cleaned["removed"], json!(["001-auth"]));
    assert!(!worktree.exists());
}

#[tokio::test]
async fn test_unknown_tool_and_bad_arguments() {
    let project = TestProject::new();
    let orchestrator = project.orchestrator();

    let unknown = orchestrator.call_tool("rm_rf", json!({})).await;
    assert_eq!(unknown, json!({"error": "Unknown tool: rm_rf"}));

    let invalid = orchestrator
        .call_tool("get_spec_status", json!({"project_dir": project.project_dir()}))
        .await;
    assert!(invalid["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid arguments for get_spec_status"));

    let bad_mode = orchestrator
        .call_tool(
            "run_build",
            json!({"spec_id": "001", "mode": "sideways", "project_dir": project.project_dir()}),
        )
        .await;
    assert!(bad_mode["error"].as_str().is_some());
}
