//! Launching the external execution engine.
//!
//! Build, QA and follow-up jobs are detached: they run in their own process
//! group with null stdio and report progress only through the plan file.
//! Merge is the one synchronous job and is bounded by a timeout.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::phase_config::PhaseConfig;
use crate::plan::SpecDir;
use crate::util::tail_lines;
use crate::{alog, alog_debug, alog_trace, alog_warn, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Build,
    Qa,
    Followup,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Build => "build",
            JobKind::Qa => "qa",
            JobKind::Followup => "followup",
        }
    }
}

/// Where a build writes its changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// In the spec's own worktree.
    #[default]
    Isolated,
    /// Straight into the project checkout.
    Direct,
}

impl BuildMode {
    pub fn flag(&self) -> &'static str {
        match self {
            BuildMode::Isolated => "--isolated",
            BuildMode::Direct => "--direct",
        }
    }
}

impl std::str::FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "isolated" => Ok(BuildMode::Isolated),
            "direct" => Ok(BuildMode::Direct),
            other => Err(format!("unknown build mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub model: Option<String>,
    pub max_iterations: Option<u32>,
    pub mode: BuildMode,
    pub auto_continue: bool,
    pub skip_qa: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            model: None,
            max_iterations: None,
            mode: BuildMode::Isolated,
            auto_continue: true,
            skip_qa: false,
        }
    }
}

/// A detached job and the configuration it runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRequest {
    Build {
        options: BuildOptions,
        phase: PhaseConfig,
    },
    Qa {
        phase: PhaseConfig,
    },
    Followup,
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::Build { .. } => JobKind::Build,
            JobRequest::Qa { .. } => JobKind::Qa,
            JobRequest::Followup => JobKind::Followup,
        }
    }

    /// Engine flags following `--spec` and `--project-dir`.
    pub fn flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        match self {
            JobRequest::Build { options, phase } => {
                if options.auto_continue {
                    flags.push("--auto-continue".to_string());
                }
                flags.push(options.mode.flag().to_string());
                push_phase_flags(&mut flags, phase);
                if let Some(n) = options.max_iterations.filter(|n| *n > 0) {
                    flags.push("--max-iterations".to_string());
                    flags.push(n.to_string());
                }
                if options.skip_qa {
                    flags.push("--skip-qa".to_string());
                }
            }
            JobRequest::Qa { phase } => {
                flags.push("--qa".to_string());
                push_phase_flags(&mut flags, phase);
            }
            JobRequest::Followup => flags.push("--followup".to_string()),
        }
        flags
    }
}

fn push_phase_flags(flags: &mut Vec<String>, phase: &PhaseConfig) {
    if !phase.model.is_empty() {
        flags.push("--model".to_string());
        flags.push(phase.model.clone());
    }
    flags.push("--thinking-level".to_string());
    flags.push(phase.thinking.as_str().to_string());
}

/// A fully resolved engine invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    pub fn display(&self) -> String {
        self.argv().join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// How commands reach the operating system.
pub trait ProcessRunner: Send + Sync {
    /// Start without waiting; returns the child's pid.
    fn spawn_detached(&self, command: &CommandSpec) -> Result<u32>;

    /// Run to completion, killing the child if `timeout` elapses first.
    fn run_bounded(
        &self,
        command: CommandSpec,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<ProcessOutput>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LiveRunner;

impl LiveRunner {
    /// Bare names are looked up on `PATH`; relative paths resolve against the
    /// command's working directory, not ours.
    fn check_program(command: &CommandSpec) -> Result<PathBuf> {
        let program = &command.program;
        which::which_in(program, std::env::var_os("PATH"), &command.cwd)
            .map_err(|_| Error::RunnerNotFound(program.to_string()))
    }
}

impl ProcessRunner for LiveRunner {
    fn spawn_detached(&self, command: &CommandSpec) -> Result<u32> {
        let program = Self::check_program(command)?;
        let mut cmd = std::process::Command::new(program);
        cmd.args(&command.args)
            .current_dir(&command.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            command: command.display(),
            source,
        })?;
        let pid = child.id();
        // Reap the child when it exits so long-lived callers don't collect zombies.
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(pid)
    }

    fn run_bounded(
        &self,
        command: CommandSpec,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<ProcessOutput>> {
        Box::pin(async move {
            let program = Self::check_program(&command)?;
            let mut cmd = tokio::process::Command::new(program);
            cmd.args(&command.args)
                .current_dir(&command.cwd)
                .stdin(Stdio::null())
                .kill_on_drop(true);
            #[cfg(unix)]
            cmd.process_group(0);

            match tokio::time::timeout(timeout, cmd.output()).await {
                Ok(Ok(output)) => Ok(ProcessOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                }),
                Ok(Err(source)) => Err(Error::Spawn {
                    command: command.display(),
                    source,
                }),
                Err(_) => Err(Error::Timeout(timeout)),
            }
        })
    }
}

/// Record of a launched job, written next to the spec it works on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: Uuid,
    pub kind: JobKind,
    pub spec_id: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub command: Vec<String>,
}

impl JobHandle {
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    /// `<spec-dir>/jobs/<kind>-<short-id>.json`
    pub fn persist(&self, spec_dir: &Path) -> Result<PathBuf> {
        let dir = spec_dir.join("jobs");
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}-{}.json", self.kind.as_str(), self.short_id()));
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

pub struct JobLauncher<'a> {
    runner: &'a dyn ProcessRunner,
    runner_argv: &'a [String],
}

impl<'a> JobLauncher<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, runner_argv: &'a [String]) -> Self {
        Self {
            runner,
            runner_argv,
        }
    }

    /// `<runner...> --spec <id> --project-dir <project> <flags...>`
    pub fn command(&self, spec_id: &str, project: &Path, flags: Vec<String>) -> Result<CommandSpec> {
        let (program, leading) = self
            .runner_argv
            .split_first()
            .ok_or_else(|| Error::Validation("runner command is empty".to_string()))?;
        let mut args = leading.to_vec();
        args.extend([
            "--spec".to_string(),
            spec_id.to_string(),
            "--project-dir".to_string(),
            project.display().to_string(),
        ]);
        args.extend(flags);
        Ok(CommandSpec {
            program: program.clone(),
            args,
            cwd: project.to_path_buf(),
        })
    }

    pub fn launch(&self, spec: &SpecDir, project: &Path, request: &JobRequest) -> Result<JobHandle> {
        let command = self.command(spec.id(), project, request.flags())?;
        alog!("Launching {} job: {}", request.kind().as_str(), command.display());

        let pid = self.runner.spawn_detached(&command)?;
        let handle = JobHandle {
            id: Uuid::new_v4(),
            kind: request.kind(),
            spec_id: spec.id().to_string(),
            pid,
            started_at: Utc::now(),
            command: command.argv(),
        };
        match handle.persist(spec.path()) {
            Ok(path) => alog_debug!("Job handle written to {}", path.display()),
            Err(e) => alog_warn!("Could not persist job handle for {}: {}", spec.id(), e),
        }
        Ok(handle)
    }

    pub async fn merge(
        &self,
        spec_id: &str,
        project: &Path,
        no_commit: bool,
        timeout: Duration,
    ) -> Result<ProcessOutput> {
        let mut flags = vec!["--merge".to_string()];
        if no_commit {
            flags.push("--no-commit".to_string());
        }
        let command = self.command(spec_id, project, flags)?;
        alog!("Merging spec {}: {}", spec_id, command.display());

        let output = self.runner.run_bounded(command, timeout).await?;
        alog_trace!("merge stdout:\n{}", tail_lines(&output.stdout, 40));
        if !output.success() {
            alog_warn!(
                "Merge of {} exited with {:?}: {}",
                spec_id,
                output.exit_code,
                tail_lines(&output.stderr, 10)
            );
        }
        Ok(output)
    }
}
