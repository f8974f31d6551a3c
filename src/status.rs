//! Status derivation over loaded plan state. Everything here is pure.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::plan::{ImplementationPlan, PlanPhase, QaReport, QaState, Subtask, SubtaskStatus};

/// A QA report counts as passing when it carries a check mark or "passed".
static QA_PASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)passed|✅").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecStatus {
    Pending,
    InProgress,
    Complete,
    QaComplete,
    Stuck,
}

impl SpecStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, SpecStatus::Complete | SpecStatus::QaComplete)
    }
}

impl fmt::Display for SpecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpecStatus::Pending => "pending",
            SpecStatus::InProgress => "in_progress",
            SpecStatus::Complete => "complete",
            SpecStatus::QaComplete => "qa_complete",
            SpecStatus::Stuck => "stuck",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubtaskCounts {
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub stuck: usize,
    pub total: usize,
}

impl SubtaskCounts {
    pub fn tally<'a>(subtasks: impl IntoIterator<Item = &'a Subtask>) -> Self {
        let mut counts = Self::default();
        for subtask in subtasks {
            counts.total += 1;
            match subtask.status {
                SubtaskStatus::Complete => counts.completed += 1,
                SubtaskStatus::InProgress => counts.in_progress += 1,
                SubtaskStatus::Stuck => counts.stuck += 1,
                SubtaskStatus::Pending => counts.pending += 1,
            }
        }
        counts
    }

    pub fn from_plan(plan: Option<&ImplementationPlan>) -> Self {
        plan.map(|p| Self::tally(p.subtasks())).unwrap_or_default()
    }
}

/// Overall status from subtask counts. The first matching rule wins.
pub fn status_from_counts(counts: &SubtaskCounts, has_qa_report: bool) -> SpecStatus {
    if counts.total == 0 {
        SpecStatus::Pending
    } else if counts.completed == counts.total {
        if has_qa_report {
            SpecStatus::QaComplete
        } else {
            SpecStatus::Complete
        }
    } else if counts.in_progress > 0 {
        SpecStatus::InProgress
    } else if counts.stuck > 0 {
        SpecStatus::Stuck
    } else {
        SpecStatus::Pending
    }
}

pub fn spec_status(plan: Option<&ImplementationPlan>, has_qa_report: bool) -> SpecStatus {
    status_from_counts(&SubtaskCounts::from_plan(plan), has_qa_report)
}

/// An empty phase has nothing left to do and reads as complete.
pub fn phase_status(phase: &PlanPhase) -> PhaseStatus {
    let counts = SubtaskCounts::tally(&phase.subtasks);
    if counts.completed == counts.total {
        PhaseStatus::Complete
    } else if counts.completed > 0 || counts.in_progress > 0 {
        PhaseStatus::InProgress
    } else {
        PhaseStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseSummary {
    pub name: String,
    pub status: PhaseStatus,
    pub subtasks: usize,
    pub completed: usize,
}

pub fn phase_summaries(plan: Option<&ImplementationPlan>) -> Vec<PhaseSummary> {
    let Some(plan) = plan else {
        return Vec::new();
    };
    plan.phases
        .iter()
        .map(|phase| {
            let counts = SubtaskCounts::tally(&phase.subtasks);
            PhaseSummary {
                name: phase.name.clone(),
                status: phase_status(phase),
                subtasks: counts.total,
                completed: counts.completed,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentSubtask {
    pub id: Option<String>,
    pub description: Option<String>,
    pub attempts: u32,
}

/// The first in-progress subtask in plan order.
pub fn current_subtask(plan: Option<&ImplementationPlan>) -> Option<CurrentSubtask> {
    plan?
        .subtasks()
        .find(|s| s.status == SubtaskStatus::InProgress)
        .map(|s| CurrentSubtask {
            id: s.id.clone(),
            description: s.description.clone(),
            attempts: s.attempts,
        })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QaSummary {
    pub qa_run: bool,
    pub passed: bool,
    pub issues: Vec<Value>,
    pub last_run: Option<Value>,
}

/// `qa_state.json` wins; otherwise the markdown report is scanned for a
/// pass marker and dated by its modification time.
pub fn qa_summary(state: Option<QaState>, report: Option<&QaReport>) -> QaSummary {
    if let Some(state) = state {
        return QaSummary {
            qa_run: true,
            passed: state.passed,
            issues: state.issues,
            last_run: state.last_run,
        };
    }
    match report {
        Some(report) => QaSummary {
            qa_run: true,
            passed: QA_PASS_RE.is_match(&report.content),
            issues: Vec::new(),
            last_run: report.modified.map(|t| Value::String(t.to_rfc3339())),
        },
        None => QaSummary::default(),
    }
}
