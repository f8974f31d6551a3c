//! Per-spec worktree lifecycle: listing, inspection, merge preview and
//! confirmation-gated removal.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use crate::git::Vcs;
use crate::plan::ProjectLayout;
use crate::{alog, alog_debug, alog_warn};

/// Number of commits `inspect` looks back over.
pub const REVIEW_WINDOW: usize = 5;

pub const DISCARD_BLOCKED_MESSAGE: &str =
    "Discard requires confirm=true. This will permanently delete the worktree and all changes.";
pub const CLEANUP_BLOCKED_MESSAGE: &str =
    "Cleanup requires confirm=true. This will delete ALL worktrees.";

/// Proof that the caller confirmed a destructive operation.
///
/// Only obtainable through [`Confirmed::from_flag`], so a removal can never
/// run on an unconfirmed request.
#[derive(Debug, Clone, Copy)]
pub struct Confirmed(());

impl Confirmed {
    pub fn from_flag(confirm: bool) -> Option<Self> {
        confirm.then_some(Confirmed(()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorktreeInfo {
    pub spec_id: String,
    pub path: String,
    pub branch: Option<String>,
    /// Why `branch` is null, when the lookup failed rather than finding a
    /// detached HEAD.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildInspection {
    pub files_changed: Vec<String>,
    pub commits: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergePreview {
    pub has_worktree: bool,
    pub can_merge: bool,
    pub branch: Option<String>,
    pub conflicts: Vec<String>,
    pub files_to_merge: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardOutcome {
    NoWorktree,
    Discarded(DiscardReport),
}

/// What a confirmed discard actually did. Both steps are best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscardReport {
    pub worktree_removed: bool,
    pub branch_deleted: bool,
    pub branch: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStatus {
    Success,
    Partial,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    pub worktree: String,
    pub error: String,
}

/// Result of removing every worktree of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<String>,
    pub failed: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// `Error` only when nothing could be removed at all.
    pub fn status(&self) -> CleanupStatus {
        if self.is_success() {
            CleanupStatus::Success
        } else if self.removed.is_empty() {
            CleanupStatus::Error
        } else {
            CleanupStatus::Partial
        }
    }
}

pub struct WorktreeManager<'a> {
    layout: &'a ProjectLayout,
    vcs: &'a dyn Vcs,
    trunk: &'a str,
}

impl<'a> WorktreeManager<'a> {
    pub fn new(layout: &'a ProjectLayout, vcs: &'a dyn Vcs, trunk: &'a str) -> Self {
        Self { layout, vcs, trunk }
    }

    pub fn worktree_path(&self, spec_id: &str) -> PathBuf {
        self.layout.worktree_path(spec_id)
    }

    pub fn has_worktree(&self, spec_id: &str) -> bool {
        self.worktree_path(spec_id).is_dir()
    }

    /// Worktree directories sorted by name. Missing root means none.
    fn worktree_dirs(&self) -> Vec<(String, PathBuf)> {
        let Ok(entries) = fs::read_dir(self.layout.worktrees_dir()) else {
            return Vec::new();
        };
        let mut dirs: Vec<(String, PathBuf)> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter_map(|p| Some((p.file_name()?.to_str()?.to_string(), p)))
            .collect();
        dirs.sort_by(|a, b| a.0.cmp(&b.0));
        dirs
    }

    pub fn list(&self) -> Vec<WorktreeInfo> {
        self.worktree_dirs()
            .into_iter()
            .map(|(spec_id, path)| {
                let (branch, branch_error) = match self.vcs.current_branch(&path) {
                    Ok(branch) => (branch, None),
                    Err(e) => {
                        alog_debug!("Branch lookup failed for {}: {}", path.display(), e);
                        (None, Some(e.to_string()))
                    }
                };
                WorktreeInfo {
                    spec_id,
                    path: path.display().to_string(),
                    branch,
                    branch_error,
                }
            })
            .collect()
    }

    /// Recent changes in a spec's worktree; `None` when it has none.
    pub fn inspect(&self, spec_id: &str) -> Option<BuildInspection> {
        let path = self.worktree_path(spec_id);
        if !path.is_dir() {
            return None;
        }
        let files_changed = self
            .vcs
            .changed_files(&path, REVIEW_WINDOW)
            .unwrap_or_else(|e| {
                alog_debug!("changed_files failed for {}: {}", spec_id, e);
                Vec::new()
            });
        let commits = self
            .vcs
            .recent_commits(&path, REVIEW_WINDOW)
            .unwrap_or_else(|e| {
                alog_debug!("recent_commits failed for {}: {}", spec_id, e);
                Vec::new()
            });
        Some(BuildInspection {
            files_changed,
            commits,
        })
    }

    pub fn preview_merge(&self, spec_id: &str) -> MergePreview {
        let path = self.worktree_path(spec_id);
        if !path.is_dir() {
            return MergePreview {
                message: Some("No worktree found for this spec".to_string()),
                ..MergePreview::default()
            };
        }

        let mut preview = MergePreview {
            has_worktree: true,
            ..MergePreview::default()
        };
        match self.vcs.current_branch(&path) {
            Ok(branch) => preview.branch = branch,
            Err(e) => {
                preview.conflicts = vec![format!("Could not resolve worktree branch: {}", e)];
                return preview;
            }
        }

        match self.vcs.merge_check(&path, self.trunk) {
            Ok(check) => {
                preview.can_merge = check.conflicts.is_empty();
                preview.conflicts = check.conflicts;
                preview.files_to_merge = check.files_to_merge;
            }
            Err(e) => {
                alog_warn!("Merge check failed for {}: {}", spec_id, e);
                preview.conflicts = vec![e.to_string()];
            }
        }
        preview
    }

    pub fn discard(&self, spec_id: &str, _confirmed: Confirmed) -> DiscardOutcome {
        let path = self.worktree_path(spec_id);
        if !path.is_dir() {
            return DiscardOutcome::NoWorktree;
        }

        alog!("Discarding worktree for spec {}", spec_id);
        let mut report = DiscardReport {
            branch: self.layout.branch_name(spec_id),
            ..DiscardReport::default()
        };
        match self.vcs.remove_worktree(self.layout.root(), &path) {
            Ok(()) => report.worktree_removed = true,
            Err(e) => {
                alog_warn!("Worktree removal failed for {}: {}", spec_id, e);
                report.warnings.push(format!("worktree: {}", e));
            }
        }
        match self.vcs.delete_branch(self.layout.root(), &report.branch) {
            Ok(deleted) => report.branch_deleted = deleted,
            Err(e) => {
                alog_warn!("Branch deletion failed for {}: {}", report.branch, e);
                report.warnings.push(format!("branch: {}", e));
            }
        }
        DiscardOutcome::Discarded(report)
    }

    /// Remove every worktree and its branch, collecting failures rather than
    /// stopping at the first.
    pub fn cleanup_all(&self, _confirmed: Confirmed) -> CleanupReport {
        let mut report = CleanupReport::default();
        for (spec_id, path) in self.worktree_dirs() {
            match self.vcs.remove_worktree(self.layout.root(), &path) {
                Ok(()) => {
                    let branch = self.layout.branch_name(&spec_id);
                    if let Err(e) = self.vcs.delete_branch(self.layout.root(), &branch) {
                        alog_warn!("Branch deletion failed for {}: {}", branch, e);
                    }
                    report.removed.push(spec_id);
                }
                Err(e) => {
                    alog_warn!("Cleanup failed for {}: {}", path.display(), e);
                    report.failed.push(CleanupFailure {
                        worktree: spec_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        alog!(
            "Cleanup removed {} worktree(s), {} failed",
            report.removed_count(),
            report.failed_count()
        );
        report
    }
}
