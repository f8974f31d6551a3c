//! git2-backed repository operations behind the [`Vcs`] port.

use std::path::Path;

use git2::{BranchType, Commit, Diff, ErrorCode, Index, Repository, Tree, WorktreePruneOptions};

use crate::{alog_debug, alog_warn, Result};

/// Outcome of a dry-run merge of a worktree's HEAD into trunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeCheck {
    /// One line per conflicting path.
    pub conflicts: Vec<String>,
    /// Paths the branch changes relative to the merge base.
    pub files_to_merge: Vec<String>,
}

/// The repository operations the worktree manager needs.
///
/// Methods take explicit paths so a single instance serves every project.
pub trait Vcs: Send + Sync {
    /// `Ok(None)` when HEAD is detached; `Err` when the lookup itself failed.
    fn current_branch(&self, worktree: &Path) -> Result<Option<String>>;

    /// Paths touched by the last `window` commits on HEAD.
    fn changed_files(&self, worktree: &Path, window: usize) -> Result<Vec<String>>;

    /// One-line summaries of the last `limit` commits, newest first.
    fn recent_commits(&self, worktree: &Path, limit: usize) -> Result<Vec<String>>;

    /// Merge HEAD into `trunk` in memory without touching any ref or file.
    fn merge_check(&self, worktree: &Path, trunk: &str) -> Result<MergeCheck>;

    /// Unregister a worktree and delete its directory.
    fn remove_worktree(&self, repo: &Path, worktree: &Path) -> Result<()>;

    /// Force-delete a local branch. `Ok(false)` when it did not exist.
    fn delete_branch(&self, repo: &Path, branch: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GitOps;

impl GitOps {
    pub fn new() -> Self {
        Self
    }

    fn prune_options() -> WorktreePruneOptions {
        let mut opts = WorktreePruneOptions::new();
        opts.valid(true).working_tree(true).locked(true);
        opts
    }

    /// Remove `.git/worktrees/<name>`; git treats the branch as checked out
    /// while it exists.
    fn cleanup_worktree_admin_dir(repo: &Repository, worktree_name: &str) {
        let admin_dir = repo.commondir().join("worktrees").join(worktree_name);
        if admin_dir.exists() {
            alog_debug!("Cleaning up worktree admin dir: {}", admin_dir.display());
            let _ = std::fs::remove_dir_all(&admin_dir);
        }
    }

    fn prune_stale_worktrees(repo: &Repository) {
        let Ok(worktrees) = repo.worktrees() else {
            return;
        };
        for name in worktrees.iter().flatten() {
            if let Ok(wt) = repo.find_worktree(name) {
                if !wt.path().exists() {
                    alog_debug!("Pruning stale worktree reference: {}", name);
                    let _ = wt.prune(Some(&mut Self::prune_options()));
                }
            }
        }
    }

    fn diff_paths(diff: &Diff<'_>) -> Vec<String> {
        let mut paths: Vec<String> = diff
            .deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.to_string_lossy().to_string())
            })
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    fn conflict_lines(index: &Index) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let path = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref())
                .map(|e| String::from_utf8_lossy(&e.path).to_string())
                .unwrap_or_default();
            lines.push(format!("CONFLICT (content): Merge conflict in {}", path));
        }
        Ok(lines)
    }

    /// Walk `window` first parents back from `head`. `None` when history is
    /// shorter than the window, meaning "diff against the empty tree".
    fn window_base<'r>(head: &Commit<'r>, window: usize) -> Result<Option<Tree<'r>>> {
        let mut base = head.clone();
        for _ in 0..window {
            match base.parent(0) {
                Ok(parent) => base = parent,
                Err(_) => return Ok(None),
            }
        }
        Ok(Some(base.tree()?))
    }
}

impl Vcs for GitOps {
    fn current_branch(&self, worktree: &Path) -> Result<Option<String>> {
        let repo = Repository::open(worktree)?;
        let result = match repo.head() {
            Ok(head) if head.is_branch() => head.shorthand().map(String::from),
            Ok(_) => None,
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head_ref = repo.find_reference("HEAD")?;
                head_ref
                    .symbolic_target()
                    .map(|t| t.strip_prefix("refs/heads/").unwrap_or(t).to_string())
            }
            Err(e) => return Err(e.into()),
        };
        alog_debug!(
            "current_branch path={} branch={:?}",
            worktree.display(),
            result
        );
        Ok(result)
    }

    fn changed_files(&self, worktree: &Path, window: usize) -> Result<Vec<String>> {
        let repo = Repository::open(worktree)?;
        let head = repo.head()?.peel_to_commit()?;
        let base = Self::window_base(&head, window)?;
        let diff = repo.diff_tree_to_tree(base.as_ref(), Some(&head.tree()?), None)?;
        Ok(Self::diff_paths(&diff))
    }

    fn recent_commits(&self, worktree: &Path, limit: usize) -> Result<Vec<String>> {
        let repo = Repository::open(worktree)?;
        let mut revwalk = repo.revwalk()?;
        revwalk.push_head()?;
        let mut commits = Vec::new();
        for oid in revwalk.take(limit) {
            let commit = repo.find_commit(oid?)?;
            commits.push(format!(
                "{:.7} {}",
                commit.id(),
                commit.summary().unwrap_or_default()
            ));
        }
        Ok(commits)
    }

    fn merge_check(&self, worktree: &Path, trunk: &str) -> Result<MergeCheck> {
        alog_debug!("merge_check path={} trunk={}", worktree.display(), trunk);
        let repo = Repository::open(worktree)?;
        let ours = repo
            .find_branch(trunk, BranchType::Local)?
            .get()
            .peel_to_commit()?;
        let theirs = repo.head()?.peel_to_commit()?;

        let base_tree = match repo.merge_base(ours.id(), theirs.id()) {
            Ok(oid) => Some(repo.find_commit(oid)?.tree()?),
            Err(e) if e.code() == ErrorCode::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let diff = repo.diff_tree_to_tree(base_tree.as_ref(), Some(&theirs.tree()?), None)?;
        let files_to_merge = Self::diff_paths(&diff);

        let index = repo.merge_commits(&ours, &theirs, None)?;
        let conflicts = if index.has_conflicts() {
            Self::conflict_lines(&index)?
        } else {
            Vec::new()
        };

        Ok(MergeCheck {
            conflicts,
            files_to_merge,
        })
    }

    fn remove_worktree(&self, repo_path: &Path, worktree: &Path) -> Result<()> {
        alog_debug!(
            "remove_worktree repo={} path={}",
            repo_path.display(),
            worktree.display()
        );
        let repo = Repository::discover(repo_path)?;
        let worktrees = repo.worktrees()?;

        let folder_name = worktree
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from);

        // Registered paths may differ from ours by canonicalization, so fall
        // back to matching the folder name.
        let worktree_name = worktrees
            .iter()
            .flatten()
            .find(|name| {
                repo.find_worktree(name)
                    .map(|wt| wt.path() == worktree)
                    .unwrap_or(false)
            })
            .map(String::from)
            .or_else(|| {
                folder_name.as_ref().and_then(|fname| {
                    worktrees
                        .iter()
                        .flatten()
                        .find(|name| *name == fname.as_str())
                        .map(String::from)
                })
            });

        if let Some(name) = &worktree_name {
            if let Ok(wt) = repo.find_worktree(name) {
                let _ = wt.unlock();
                if let Err(e) = wt.prune(Some(&mut Self::prune_options())) {
                    alog_warn!("Worktree prune failed for '{}': {}", name, e);
                }
            }
        }

        if worktree.exists() {
            alog_debug!("Removing worktree directory: {}", worktree.display());
            std::fs::remove_dir_all(worktree)?;
        }

        if let Some(name) = &worktree_name {
            Self::cleanup_worktree_admin_dir(&repo, name);
        }
        if let Some(fname) = &folder_name {
            Self::cleanup_worktree_admin_dir(&repo, fname);
        }

        drop(repo);
        if let Ok(repo) = Repository::discover(repo_path) {
            Self::prune_stale_worktrees(&repo);
        }
        Ok(())
    }

    fn delete_branch(&self, repo_path: &Path, branch: &str) -> Result<bool> {
        alog_debug!("delete_branch repo={} branch={}", repo_path.display(), branch);
        let repo = Repository::discover(repo_path)?;
        let found = repo.find_branch(branch, BranchType::Local);
        match found {
            Ok(mut branch_ref) => {
                if let Err(e) = branch_ref.delete() {
                    // Still referenced by a stale worktree; drop the ref directly.
                    alog_warn!("Branch delete failed for '{}': {}, removing ref", branch, e);
                    repo.find_reference(&format!("refs/heads/{}", branch))?
                        .delete()?;
                }
                Ok(true)
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
