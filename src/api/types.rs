//! Result shapes returned by the tool surface.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::jobs::{BuildMode, JobHandle, JobKind};
use crate::phase_config::ThinkingTier;
use crate::status::{CurrentSubtask, PhaseSummary, QaSummary, SpecStatus, SubtaskCounts};
use crate::worktree::{
    BuildInspection, CleanupFailure, CleanupReport, CleanupStatus, DiscardReport, MergePreview,
    WorktreeInfo,
};

/// The one shape every spec-scoped operation returns for an unknown id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotFound {
    pub found: bool,
    pub error: String,
}

impl NotFound {
    pub fn spec(spec_id: &str) -> Self {
        Self {
            found: false,
            error: format!("Spec '{}' not found", spec_id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Lookup<T> {
    Found(T),
    NotFound(NotFound),
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Started,
    Success,
    Partial,
    Error,
    Blocked,
}

impl From<CleanupStatus> for ActionStatus {
    fn from(status: CleanupStatus) -> Self {
        match status {
            CleanupStatus::Success => ActionStatus::Success,
            CleanupStatus::Partial => ActionStatus::Partial,
            CleanupStatus::Error => ActionStatus::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubtaskProgress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecSummary {
    pub id: String,
    pub status: SpecStatus,
    pub subtasks: SubtaskProgress,
    pub worktree: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecList {
    pub specs: Vec<SpecSummary>,
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub complete: usize,
    pub project_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecStatusReport {
    pub id: String,
    pub found: bool,
    pub status: SpecStatus,
    pub approved: bool,
    pub approved_by: Option<String>,
    pub phases: Vec<PhaseSummary>,
    pub subtasks: SubtaskCounts,
    pub current_subtask: Option<CurrentSubtask>,
    pub worktree_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaStatusReport {
    pub spec_id: String,
    pub found: bool,
    #[serde(flatten)]
    pub qa: QaSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReviewReport {
    pub spec_id: String,
    pub found: bool,
    pub has_worktree: bool,
    #[serde(flatten)]
    pub inspection: BuildInspection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorktreeList {
    pub worktrees: Vec<WorktreeInfo>,
    pub total: usize,
    pub project_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergePreviewReport {
    pub spec_id: String,
    pub found: bool,
    #[serde(flatten)]
    pub preview: MergePreview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFailed {
    pub status: ActionStatus,
    pub spec_id: String,
    pub message: String,
}

impl ActionFailed {
    pub fn new(spec_id: &str, message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Error,
            spec_id: spec_id.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Blocked {
    pub status: ActionStatus,
    pub message: String,
}

impl Blocked {
    pub fn new(message: &str) -> Self {
        Self {
            status: ActionStatus::Blocked,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStarted {
    pub status: ActionStatus,
    pub spec_id: String,
    pub kind: JobKind,
    pub job_id: Uuid,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<BuildMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingTier>,
    pub message: String,
}

impl JobStarted {
    pub fn from_handle(handle: &JobHandle, message: String) -> Self {
        Self {
            status: ActionStatus::Started,
            spec_id: handle.spec_id.clone(),
            kind: handle.kind,
            job_id: handle.id,
            pid: handle.pid,
            started_at: handle.started_at,
            mode: None,
            model: None,
            thinking: None,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LaunchResult {
    Started(JobStarted),
    Failed(ActionFailed),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    pub status: ActionStatus,
    pub spec_id: String,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timed_out: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discarded {
    pub status: ActionStatus,
    pub spec_id: String,
    pub message: String,
    #[serde(flatten)]
    pub report: DiscardReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DiscardResult {
    Blocked(Blocked),
    NotFound(NotFound),
    Failed(ActionFailed),
    Discarded(Discarded),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub status: ActionStatus,
    pub removed: Vec<String>,
    pub removed_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<CleanupFailure>,
    pub project_dir: String,
}

impl CleanupSummary {
    pub fn from_report(report: CleanupReport, project_dir: String) -> Self {
        Self {
            status: report.status().into(),
            removed_count: report.removed_count(),
            removed: report.removed,
            errors: report.failed,
            project_dir,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CleanupResult {
    Blocked(Blocked),
    Done(CleanupSummary),
}
