//! Tool catalogue and JSON dispatch.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::Orchestrator;
use crate::jobs::{BuildMode, BuildOptions};
use crate::util::blocking;
use crate::{alog, alog_debug, alog_error, Result};

pub const TOOL_NAMES: [&str; 12] = [
    "list_specs",
    "get_spec_status",
    "get_qa_status",
    "review_build",
    "list_worktrees",
    "merge_preview",
    "run_build",
    "run_qa",
    "run_followup",
    "merge_build",
    "discard_build",
    "cleanup_worktrees",
];

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn project_dir_schema() -> Value {
    json!({"type": "string", "description": "Project directory (defaults to the configured project)"})
}

fn spec_schema(extra: Value) -> Value {
    let mut properties = Map::new();
    properties.insert(
        "spec_id".into(),
        json!({"type": "string", "description": "Spec id or numeric prefix, e.g. 001"}),
    );
    properties.insert("project_dir".into(), project_dir_schema());
    if let Value::Object(extra) = extra {
        properties.extend(extra);
    }
    json!({"type": "object", "properties": properties, "required": ["spec_id"]})
}

fn project_schema(extra: Value) -> Value {
    let mut properties = Map::new();
    properties.insert("project_dir".into(), project_dir_schema());
    if let Value::Object(extra) = extra {
        properties.extend(extra);
    }
    json!({"type": "object", "properties": properties})
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "list_specs",
            description: "List every spec in the project with its derived status",
            input_schema: project_schema(json!({})),
        },
        ToolDefinition {
            name: "get_spec_status",
            description: "Detailed status of one spec: phases, subtask counts, current subtask",
            input_schema: spec_schema(json!({})),
        },
        ToolDefinition {
            name: "get_qa_status",
            description: "QA validation result for a spec",
            input_schema: spec_schema(json!({})),
        },
        ToolDefinition {
            name: "review_build",
            description: "Files changed and recent commits in a spec's worktree",
            input_schema: spec_schema(json!({})),
        },
        ToolDefinition {
            name: "list_worktrees",
            description: "List spec worktrees and their branches",
            input_schema: project_schema(json!({})),
        },
        ToolDefinition {
            name: "merge_preview",
            description: "Check whether a spec's branch merges cleanly without merging it",
            input_schema: spec_schema(json!({})),
        },
        ToolDefinition {
            name: "run_build",
            description: "Start a background build of a spec",
            input_schema: spec_schema(json!({
                "model": {"type": "string", "description": "Model to use"},
                "max_iterations": {"type": "integer", "description": "Iteration limit"},
                "mode": {"type": "string", "enum": ["isolated", "direct"], "description": "Build in a worktree or directly in the project"},
                "auto_continue": {"type": "boolean", "description": "Continue without prompting (default true)"},
                "skip_qa": {"type": "boolean", "description": "Skip QA after the build"}
            })),
        },
        ToolDefinition {
            name: "run_qa",
            description: "Start the background QA validation loop for a spec",
            input_schema: spec_schema(json!({})),
        },
        ToolDefinition {
            name: "run_followup",
            description: "Start background planning of follow-up work on a spec",
            input_schema: spec_schema(json!({})),
        },
        ToolDefinition {
            name: "merge_build",
            description: "Merge a finished build into the project (waits up to the merge timeout)",
            input_schema: spec_schema(json!({
                "no_commit": {"type": "boolean", "description": "Stage the changes without committing"}
            })),
        },
        ToolDefinition {
            name: "discard_build",
            description: "Delete a spec's worktree and branch. Requires confirm=true",
            input_schema: spec_schema(json!({
                "confirm": {"type": "boolean", "description": "Must be true to discard"}
            })),
        },
        ToolDefinition {
            name: "cleanup_worktrees",
            description: "Delete every spec worktree and branch. Requires confirm=true",
            input_schema: project_schema(json!({
                "confirm": {"type": "boolean", "description": "Must be true to clean up"}
            })),
        },
    ]
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectArgs {
    #[serde(default)]
    pub project_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpecArgs {
    pub spec_id: String,
    #[serde(default)]
    pub project_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildArgs {
    pub spec_id: String,
    #[serde(default)]
    pub project_dir: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub mode: BuildMode,
    #[serde(default)]
    pub auto_continue: Option<bool>,
    #[serde(default)]
    pub skip_qa: bool,
}

impl BuildArgs {
    pub fn options(&self) -> BuildOptions {
        BuildOptions {
            model: self.model.clone(),
            max_iterations: self.max_iterations,
            mode: self.mode,
            auto_continue: self.auto_continue.unwrap_or(true),
            skip_qa: self.skip_qa,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeArgs {
    pub spec_id: String,
    #[serde(default)]
    pub project_dir: Option<String>,
    #[serde(default)]
    pub no_commit: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscardArgs {
    pub spec_id: String,
    #[serde(default)]
    pub project_dir: Option<String>,
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CleanupArgs {
    #[serde(default)]
    pub project_dir: Option<String>,
    #[serde(default)]
    pub confirm: bool,
}

/// A decoded tool invocation, `{"name": ..., "arguments": {...}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    ListSpecs(ProjectArgs),
    GetSpecStatus(SpecArgs),
    GetQaStatus(SpecArgs),
    ReviewBuild(SpecArgs),
    ListWorktrees(ProjectArgs),
    MergePreview(SpecArgs),
    RunBuild(BuildArgs),
    RunQa(SpecArgs),
    RunFollowup(SpecArgs),
    MergeBuild(MergeArgs),
    DiscardBuild(DiscardArgs),
    CleanupWorktrees(CleanupArgs),
}

impl ToolCall {
    /// Decode arguments for `name`. The error value is the structured result
    /// to hand back to the caller.
    pub fn parse(name: &str, arguments: Value) -> std::result::Result<Self, Value> {
        if !TOOL_NAMES.contains(&name) {
            return Err(json!({"error": format!("Unknown tool: {}", name)}));
        }
        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        serde_json::from_value(json!({"name": name, "arguments": arguments}))
            .map_err(|e| json!({"error": format!("Invalid arguments for {}: {}", name, e)}))
    }
}

impl Orchestrator {
    /// Run a synchronous operation on the blocking pool and serialize it.
    async fn run_blocking<F, T>(&self, f: F) -> Result<Value>
    where
        F: FnOnce(Orchestrator) -> T + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let this = self.clone();
        blocking(move || Ok(serde_json::to_value(f(this))?)).await
    }

    pub async fn execute(&self, call: ToolCall) -> Result<Value> {
        match call {
            ToolCall::ListSpecs(a) => {
                self.run_blocking(move |o| o.list_specs(a.project_dir.as_deref()))
                    .await
            }
            ToolCall::GetSpecStatus(a) => {
                self.run_blocking(move |o| o.get_spec_status(&a.spec_id, a.project_dir.as_deref()))
                    .await
            }
            ToolCall::GetQaStatus(a) => {
                self.run_blocking(move |o| o.get_qa_status(&a.spec_id, a.project_dir.as_deref()))
                    .await
            }
            ToolCall::ReviewBuild(a) => {
                self.run_blocking(move |o| o.review_build(&a.spec_id, a.project_dir.as_deref()))
                    .await
            }
            ToolCall::ListWorktrees(a) => {
                self.run_blocking(move |o| o.list_worktrees(a.project_dir.as_deref()))
                    .await
            }
            ToolCall::MergePreview(a) => {
                self.run_blocking(move |o| o.merge_preview(&a.spec_id, a.project_dir.as_deref()))
                    .await
            }
            ToolCall::RunBuild(a) => {
                self.run_blocking(move |o| {
                    o.run_build(&a.spec_id, a.project_dir.as_deref(), a.options())
                })
                .await
            }
            ToolCall::RunQa(a) => {
                self.run_blocking(move |o| o.run_qa(&a.spec_id, a.project_dir.as_deref()))
                    .await
            }
            ToolCall::RunFollowup(a) => {
                self.run_blocking(move |o| o.run_followup(&a.spec_id, a.project_dir.as_deref()))
                    .await
            }
            ToolCall::MergeBuild(a) => Ok(serde_json::to_value(
                self.merge_build(&a.spec_id, a.project_dir.as_deref(), a.no_commit)
                    .await,
            )?),
            ToolCall::DiscardBuild(a) => {
                self.run_blocking(move |o| {
                    o.discard_build(&a.spec_id, a.project_dir.as_deref(), a.confirm)
                })
                .await
            }
            ToolCall::CleanupWorktrees(a) => {
                self.run_blocking(move |o| o.cleanup_worktrees(a.project_dir.as_deref(), a.confirm))
                    .await
            }
        }
    }

    /// Dispatch a tool by name. Every failure comes back as a JSON result.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Value {
        alog!("call_tool name={}", name);
        alog_debug!("call_tool arguments={}", arguments);
        let call = match ToolCall::parse(name, arguments) {
            Ok(call) => call,
            Err(result) => return result,
        };
        match self.execute(call).await {
            Ok(value) => value,
            Err(e) => {
                alog_error!("Tool {} failed: {}", name, e);
                json!({"error": e.to_string()})
            }
        }
    }
}
