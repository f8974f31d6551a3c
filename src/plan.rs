//! On-disk spec state: project layout, spec lookup and artifact loading.
//!
//! Every artifact is owned by the external execution engine and may be
//! rewritten while we read it. Loaders therefore never fail: a missing file
//! and a file that does not parse both come back as `None`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::{alog_debug, alog_warn};

pub const PLAN_FILE: &str = "implementation_plan.json";
pub const REVIEW_FILE: &str = "review_state.json";
pub const QA_REPORT_FILE: &str = "qa_report.md";
pub const QA_STATE_FILE: &str = "qa_state.json";
pub const TASK_METADATA_FILE: &str = "task_metadata.json";

/// Where a project keeps its specs and worktrees.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
    tool_dir: String,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>, tool_dir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            tool_dir: tool_dir.into(),
        }
    }

    pub fn from_config(config: &Config, project_dir: Option<&str>) -> Self {
        Self::new(config.project_root(project_dir), config.effective_tool_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<project>/.<tool>/specs`
    pub fn specs_dir(&self) -> PathBuf {
        self.root.join(format!(".{}", self.tool_dir)).join("specs")
    }

    /// `<project>/.<tool>-worktrees`
    pub fn worktrees_dir(&self) -> PathBuf {
        self.root.join(format!(".{}-worktrees", self.tool_dir))
    }

    pub fn worktree_path(&self, spec_id: &str) -> PathBuf {
        self.worktrees_dir().join(spec_id)
    }

    /// Branch the build step creates for a spec's worktree.
    pub fn branch_name(&self, spec_id: &str) -> String {
        format!("{}/{}", self.tool_dir, spec_id)
    }

    /// Resolve a spec id. An exact directory name wins; otherwise the first
    /// directory (by name) starting with `<id>-`.
    pub fn find_spec(&self, spec_id: &str) -> Option<SpecDir> {
        if spec_id.is_empty() {
            return None;
        }
        let specs = self.list_specs();
        if let Some(exact) = specs.iter().find(|s| s.id == spec_id) {
            return Some(exact.clone());
        }
        let prefix = format!("{}-", spec_id);
        specs.into_iter().find(|s| s.id.starts_with(&prefix))
    }

    /// All spec directories, sorted by name.
    pub fn list_specs(&self) -> Vec<SpecDir> {
        let Ok(entries) = fs::read_dir(self.specs_dir()) else {
            return Vec::new();
        };
        let mut specs: Vec<SpecDir> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter_map(|path| {
                let id = path.file_name()?.to_str()?.to_string();
                Some(SpecDir { id, path })
            })
            .collect();
        specs.sort_by(|a, b| a.id.cmp(&b.id));
        specs
    }
}

/// A resolved spec directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecDir {
    id: String,
    path: PathBuf,
}

impl SpecDir {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_plan(&self) -> Option<ImplementationPlan> {
        load_json(&self.path.join(PLAN_FILE))
    }

    pub fn load_review(&self) -> Option<ReviewState> {
        load_json(&self.path.join(REVIEW_FILE))
    }

    pub fn load_qa_state(&self) -> Option<QaState> {
        load_json(&self.path.join(QA_STATE_FILE))
    }

    pub fn load_task_metadata(&self) -> Option<TaskMetadata> {
        TaskMetadata::load(&self.path)
    }

    pub fn has_qa_report(&self) -> bool {
        self.path.join(QA_REPORT_FILE).is_file()
    }

    pub fn load_qa_report(&self) -> Option<QaReport> {
        let path = self.path.join(QA_REPORT_FILE);
        let content = fs::read_to_string(&path).ok()?;
        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Local>::from);
        Some(QaReport { content, modified })
    }
}

/// Read and parse a JSON artifact, treating any failure as absence.
fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            alog_warn!("Could not read {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            alog_warn!("Ignoring malformed {}: {}", path.display(), e);
            None
        }
    }
}

/// Subtask lifecycle as written by the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
    Stuck,
}

impl SubtaskStatus {
    /// Unrecognized values normalize to `Pending`.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "in_progress" => SubtaskStatus::InProgress,
            "complete" => SubtaskStatus::Complete,
            "stuck" => SubtaskStatus::Stuck,
            _ => SubtaskStatus::Pending,
        }
    }
}

impl<'de> Deserialize<'de> for SubtaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(value
            .as_str()
            .map(SubtaskStatus::parse_lenient)
            .unwrap_or_default())
    }
}

impl std::fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubtaskStatus::Pending => write!(f, "pending"),
            SubtaskStatus::InProgress => write!(f, "in_progress"),
            SubtaskStatus::Complete => write!(f, "complete"),
            SubtaskStatus::Stuck => write!(f, "stuck"),
        }
    }
}

/// `implementation_plan.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImplementationPlan {
    #[serde(default, deserialize_with = "lenient_list")]
    pub phases: Vec<PlanPhase>,
}

impl ImplementationPlan {
    pub fn subtasks(&self) -> impl Iterator<Item = &Subtask> {
        self.phases.iter().flat_map(|p| p.subtasks.iter())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanPhase {
    #[serde(default = "unknown_phase_name", deserialize_with = "phase_name")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub subtasks: Vec<Subtask>,
}

fn unknown_phase_name() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subtask {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: SubtaskStatus,
    #[serde(default = "first_attempt", deserialize_with = "attempt_count")]
    pub attempts: u32,
}

fn first_attempt() -> u32 {
    1
}

fn phase_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_string(deserializer)?.unwrap_or_else(unknown_phase_name))
}

/// Integers and numeric strings; anything else counts as the first attempt.
fn attempt_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let attempts = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(attempts.unwrap_or_else(first_attempt))
}

/// A list field that is null or not an array reads as empty.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        list @ Value::Array(_) => serde_json::from_value(list).map_err(serde::de::Error::custom),
        _ => Ok(Vec::new()),
    }
}

/// Accept strings and numbers; anything else reads as absent.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// `review_state.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewState {
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub approved_by: Option<String>,
}

/// `qa_state.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QaState {
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub issues: Vec<Value>,
    #[serde(default)]
    pub last_run: Option<Value>,
}

/// `qa_report.md` contents plus its modification time.
#[derive(Debug, Clone)]
pub struct QaReport {
    pub content: String,
    pub modified: Option<DateTime<Local>>,
}

/// Model-related fields of `task_metadata.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    #[serde(default)]
    pub is_auto_profile: bool,
    #[serde(default)]
    pub phase_models: Option<HashMap<String, String>>,
    #[serde(default)]
    pub phase_thinking: Option<HashMap<String, String>>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub thinking_level: Option<String>,
}

impl TaskMetadata {
    pub fn load(spec_dir: &Path) -> Option<Self> {
        let metadata = load_json(&spec_dir.join(TASK_METADATA_FILE));
        if metadata.is_none() {
            alog_debug!("No task metadata in {}", spec_dir.display());
        }
        metadata
    }

    /// Per-phase model map, only when the auto profile is active and the map
    /// is non-empty.
    pub fn auto_phase_models(&self) -> Option<&HashMap<String, String>> {
        if !self.is_auto_profile {
            return None;
        }
        self.phase_models.as_ref().filter(|m| !m.is_empty())
    }

    pub fn auto_phase_thinking(&self) -> Option<&HashMap<String, String>> {
        if !self.is_auto_profile {
            return None;
        }
        self.phase_thinking.as_ref().filter(|m| !m.is_empty())
    }

    pub fn single_model(&self) -> Option<&str> {
        self.model.as_deref().filter(|m| !m.is_empty())
    }

    pub fn single_thinking(&self) -> Option<&str> {
        self.thinking_level.as_deref().filter(|t| !t.is_empty())
    }
}
