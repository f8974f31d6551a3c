//! The tool surface: every operation an agent or the CLI can invoke.
//!
//! Each call resolves its project root afresh and reads state straight from
//! disk; nothing is cached between calls.

mod tools;
mod types;

use std::sync::Arc;

use crate::config::Config;
use crate::git::{GitOps, Vcs};
use crate::jobs::{BuildOptions, JobLauncher, JobRequest, LiveRunner, ProcessRunner};
use crate::phase_config::{ExecutionPhase, ModelOverrides, PhaseConfigResolver};
use crate::plan::{ProjectLayout, SpecDir};
use crate::status::{
    current_subtask, phase_summaries, qa_summary, status_from_counts, SpecStatus, SubtaskCounts,
};
use crate::worktree::{
    Confirmed, DiscardOutcome, WorktreeManager, CLEANUP_BLOCKED_MESSAGE, DISCARD_BLOCKED_MESSAGE,
};
use crate::{alog, Error};

pub use tools::{
    tool_definitions, BuildArgs, CleanupArgs, DiscardArgs, MergeArgs, ProjectArgs, SpecArgs,
    ToolCall, ToolDefinition, TOOL_NAMES,
};
pub use types::*;

#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<Config>,
    overrides: Arc<ModelOverrides>,
    vcs: Arc<dyn Vcs>,
    runner: Arc<dyn ProcessRunner>,
}

impl Orchestrator {
    pub fn new(config: Config, overrides: ModelOverrides) -> Self {
        Self::with_ports(config, overrides, Arc::new(GitOps::new()), Arc::new(LiveRunner))
    }

    pub fn with_ports(
        config: Config,
        overrides: ModelOverrides,
        vcs: Arc<dyn Vcs>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            overrides: Arc::new(overrides),
            vcs,
            runner,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self, project_dir: Option<&str>) -> ProjectLayout {
        ProjectLayout::from_config(&self.config, project_dir)
    }

    fn worktrees<'a>(&'a self, layout: &'a ProjectLayout) -> WorktreeManager<'a> {
        WorktreeManager::new(layout, self.vcs.as_ref(), self.config.effective_trunk_branch())
    }

    fn find_spec(&self, layout: &ProjectLayout, spec_id: &str) -> Option<SpecDir> {
        let spec = layout.find_spec(spec_id);
        if spec.is_none() {
            alog!("Spec '{}' not found under {}", spec_id, layout.specs_dir().display());
        }
        spec
    }

    pub fn list_specs(&self, project_dir: Option<&str>) -> SpecList {
        let layout = self.layout(project_dir);
        let worktrees = self.worktrees(&layout);

        let specs: Vec<SpecSummary> = layout
            .list_specs()
            .into_iter()
            .map(|spec| {
                let counts = SubtaskCounts::from_plan(spec.load_plan().as_ref());
                SpecSummary {
                    id: spec.id().to_string(),
                    status: status_from_counts(&counts, spec.has_qa_report()),
                    subtasks: SubtaskProgress {
                        completed: counts.completed,
                        total: counts.total,
                    },
                    worktree: worktrees.has_worktree(spec.id()),
                }
            })
            .collect();

        let in_progress = specs
            .iter()
            .filter(|s| s.status == SpecStatus::InProgress)
            .count();
        let complete = specs.iter().filter(|s| s.status.is_done()).count();
        SpecList {
            total: specs.len(),
            pending: specs.len() - in_progress - complete,
            in_progress,
            complete,
            specs,
            project_dir: layout.root().display().to_string(),
        }
    }

    pub fn get_spec_status(&self, spec_id: &str, project_dir: Option<&str>) -> Lookup<SpecStatusReport> {
        let layout = self.layout(project_dir);
        let Some(spec) = self.find_spec(&layout, spec_id) else {
            return Lookup::NotFound(NotFound::spec(spec_id));
        };

        let plan = spec.load_plan();
        let review = spec.load_review().unwrap_or_default();
        let counts = SubtaskCounts::from_plan(plan.as_ref());
        let worktrees = self.worktrees(&layout);
        let worktree_path = worktrees
            .has_worktree(spec.id())
            .then(|| worktrees.worktree_path(spec.id()).display().to_string());

        Lookup::Found(SpecStatusReport {
            id: spec.id().to_string(),
            found: true,
            status: status_from_counts(&counts, spec.has_qa_report()),
            approved: review.approved,
            approved_by: review.approved_by,
            phases: phase_summaries(plan.as_ref()),
            subtasks: counts,
            current_subtask: current_subtask(plan.as_ref()),
            worktree_path,
        })
    }

    pub fn get_qa_status(&self, spec_id: &str, project_dir: Option<&str>) -> Lookup<QaStatusReport> {
        let layout = self.layout(project_dir);
        let Some(spec) = self.find_spec(&layout, spec_id) else {
            return Lookup::NotFound(NotFound::spec(spec_id));
        };
        let report = spec.load_qa_report();
        Lookup::Found(QaStatusReport {
            spec_id: spec.id().to_string(),
            found: true,
            qa: qa_summary(spec.load_qa_state(), report.as_ref()),
        })
    }

    pub fn review_build(&self, spec_id: &str, project_dir: Option<&str>) -> Lookup<BuildReviewReport> {
        let layout = self.layout(project_dir);
        let Some(spec) = self.find_spec(&layout, spec_id) else {
            return Lookup::NotFound(NotFound::spec(spec_id));
        };
        let inspection = self.worktrees(&layout).inspect(spec.id());
        Lookup::Found(BuildReviewReport {
            spec_id: spec.id().to_string(),
            found: true,
            has_worktree: inspection.is_some(),
            inspection: inspection.unwrap_or_default(),
        })
    }

    pub fn list_worktrees(&self, project_dir: Option<&str>) -> WorktreeList {
        let layout = self.layout(project_dir);
        let worktrees = self.worktrees(&layout).list();
        WorktreeList {
            total: worktrees.len(),
            worktrees,
            project_dir: layout.root().display().to_string(),
        }
    }

    pub fn merge_preview(&self, spec_id: &str, project_dir: Option<&str>) -> Lookup<MergePreviewReport> {
        let layout = self.layout(project_dir);
        let Some(spec) = self.find_spec(&layout, spec_id) else {
            return Lookup::NotFound(NotFound::spec(spec_id));
        };
        Lookup::Found(MergePreviewReport {
            spec_id: spec.id().to_string(),
            found: true,
            preview: self.worktrees(&layout).preview_merge(spec.id()),
        })
    }

    fn launch(&self, layout: &ProjectLayout, spec: &SpecDir, request: JobRequest) -> LaunchResult {
        let runner_argv = self.config.runner_argv();
        let launcher = JobLauncher::new(self.runner.as_ref(), &runner_argv);
        match launcher.launch(spec, layout.root(), &request) {
            Ok(handle) => {
                let message = match &request {
                    JobRequest::Build { options, .. } => format!(
                        "Build started for {} in {} mode",
                        spec.id(),
                        options.mode.flag().trim_start_matches("--")
                    ),
                    JobRequest::Qa { .. } => format!("QA validation started for {}", spec.id()),
                    JobRequest::Followup => {
                        format!("Follow-up planning started for {}", spec.id())
                    }
                };
                let mut started = JobStarted::from_handle(&handle, message);
                match request {
                    JobRequest::Build { options, phase } => {
                        started.mode = Some(options.mode);
                        started.model = Some(phase.model);
                        started.thinking = Some(phase.thinking);
                    }
                    JobRequest::Qa { phase } => {
                        started.model = Some(phase.model);
                        started.thinking = Some(phase.thinking);
                    }
                    JobRequest::Followup => {}
                }
                LaunchResult::Started(started)
            }
            Err(e) => LaunchResult::Failed(ActionFailed::new(spec.id(), e.to_string())),
        }
    }

    pub fn run_build(
        &self,
        spec_id: &str,
        project_dir: Option<&str>,
        options: BuildOptions,
    ) -> Lookup<LaunchResult> {
        let layout = self.layout(project_dir);
        let Some(spec) = self.find_spec(&layout, spec_id) else {
            return Lookup::NotFound(NotFound::spec(spec_id));
        };
        let phase = PhaseConfigResolver::new(&self.overrides).phase_config(
            spec.path(),
            ExecutionPhase::Coding,
            options.model.as_deref(),
            None,
        );
        Lookup::Found(self.launch(&layout, &spec, JobRequest::Build { options, phase }))
    }

    pub fn run_qa(&self, spec_id: &str, project_dir: Option<&str>) -> Lookup<LaunchResult> {
        let layout = self.layout(project_dir);
        let Some(spec) = self.find_spec(&layout, spec_id) else {
            return Lookup::NotFound(NotFound::spec(spec_id));
        };
        let phase = PhaseConfigResolver::new(&self.overrides).phase_config(
            spec.path(),
            ExecutionPhase::Qa,
            None,
            None,
        );
        Lookup::Found(self.launch(&layout, &spec, JobRequest::Qa { phase }))
    }

    pub fn run_followup(&self, spec_id: &str, project_dir: Option<&str>) -> Lookup<LaunchResult> {
        let layout = self.layout(project_dir);
        let Some(spec) = self.find_spec(&layout, spec_id) else {
            return Lookup::NotFound(NotFound::spec(spec_id));
        };
        Lookup::Found(self.launch(&layout, &spec, JobRequest::Followup))
    }

    pub async fn merge_build(
        &self,
        spec_id: &str,
        project_dir: Option<&str>,
        no_commit: bool,
    ) -> Lookup<MergeResult> {
        let layout = self.layout(project_dir);
        let Some(spec) = self.find_spec(&layout, spec_id) else {
            return Lookup::NotFound(NotFound::spec(spec_id));
        };

        let runner_argv = self.config.runner_argv();
        let launcher = JobLauncher::new(self.runner.as_ref(), &runner_argv);
        let outcome = launcher
            .merge(spec.id(), layout.root(), no_commit, self.config.merge_timeout())
            .await;

        let spec_id = spec.id().to_string();
        Lookup::Found(match outcome {
            Ok(output) if output.success() => MergeResult {
                status: ActionStatus::Success,
                spec_id,
                output: output.stdout,
                error: None,
                timed_out: false,
            },
            Ok(output) => {
                let error = if output.stderr.trim().is_empty() {
                    format!("Merge exited with status {:?}", output.exit_code)
                } else {
                    output.stderr
                };
                MergeResult {
                    status: ActionStatus::Error,
                    spec_id,
                    output: output.stdout,
                    error: Some(error),
                    timed_out: false,
                }
            }
            Err(Error::Timeout(limit)) => MergeResult {
                status: ActionStatus::Error,
                spec_id,
                output: String::new(),
                error: Some(format!("Merge timed out after {}s", limit.as_secs())),
                timed_out: true,
            },
            Err(e) => MergeResult {
                status: ActionStatus::Error,
                spec_id,
                output: String::new(),
                error: Some(e.to_string()),
                timed_out: false,
            },
        })
    }

    /// The confirmation gate is checked before the spec is even looked up.
    pub fn discard_build(&self, spec_id: &str, project_dir: Option<&str>, confirm: bool) -> DiscardResult {
        let Some(confirmed) = Confirmed::from_flag(confirm) else {
            return DiscardResult::Blocked(Blocked::new(DISCARD_BLOCKED_MESSAGE));
        };
        let layout = self.layout(project_dir);
        let Some(spec) = self.find_spec(&layout, spec_id) else {
            return DiscardResult::NotFound(NotFound::spec(spec_id));
        };

        match self.worktrees(&layout).discard(spec.id(), confirmed) {
            DiscardOutcome::NoWorktree => {
                DiscardResult::Failed(ActionFailed::new(spec.id(), "No worktree found to discard"))
            }
            DiscardOutcome::Discarded(report) => DiscardResult::Discarded(Discarded {
                status: ActionStatus::Success,
                spec_id: spec.id().to_string(),
                message: format!("Build discarded for {}", spec.id()),
                report,
            }),
        }
    }

    pub fn cleanup_worktrees(&self, project_dir: Option<&str>, confirm: bool) -> CleanupResult {
        let Some(confirmed) = Confirmed::from_flag(confirm) else {
            return CleanupResult::Blocked(Blocked::new(CLEANUP_BLOCKED_MESSAGE));
        };
        let layout = self.layout(project_dir);
        let report = self.worktrees(&layout).cleanup_all(confirmed);
        CleanupResult::Done(CleanupSummary::from_report(
            report,
            layout.root().display().to_string(),
        ))
    }
}
