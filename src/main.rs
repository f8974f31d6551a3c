use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use autospec::api::{
    tool_definitions, BuildArgs, CleanupArgs, DiscardArgs, MergeArgs, Orchestrator, ProjectArgs,
    SpecArgs, ToolCall,
};
use autospec::config::Config;
use autospec::jobs::BuildMode;
use autospec::phase_config::ModelOverrides;
use autospec::{alog, alog_debug, alog_warn, Error, Result};

/// autospec - track and drive autonomous spec builds in isolated git worktrees
#[derive(Parser, Debug)]
#[command(name = "autospec")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    \
    AUTO_CLAUDE_PROJECT_DIR     Default project directory\n    \
    AUTO_BUILD_MODEL            Model override for every phase (also ANTHROPIC_MODEL)\n    \
    ANTHROPIC_SMALL_FAST_MODEL  Override for haiku-class models\n    \
    AUTOSPEC_DEBUG=1            Enable debug logging (alternative to --debug)\n    \
    AUTOSPEC_LOG=<level>        Force a log level\n\n\
CONFIG (~/.autospec/autospec.toml):\n    \
    runner = \"python3 /opt/auto-claude/run.py\"\n    \
    The engine runs from the project directory, so relative paths in the\n    \
    runner (including the default \"python3 run.py\") resolve against it.")]
pub struct Cli {
    /// Project directory (defaults to $AUTO_CLAUDE_PROJECT_DIR, then the config, then cwd)
    #[arg(short = 'p', long, global = true)]
    pub project_dir: Option<String>,

    /// Config file (defaults to ~/.autospec/autospec.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging (writes to ~/.autospec/autospec.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List specs and their status
    List,

    /// Show phases and subtask progress of a spec
    Status { spec_id: String },

    /// Show the QA result of a spec
    QaStatus { spec_id: String },

    /// Show files changed and recent commits in a spec's worktree
    Review { spec_id: String },

    /// List spec worktrees
    Worktrees,

    /// Check whether a spec's branch merges cleanly
    Preview { spec_id: String },

    /// Start a background build
    Build {
        spec_id: String,

        /// Model to use
        #[arg(long)]
        model: Option<String>,

        /// Iteration limit
        #[arg(long)]
        max_iterations: Option<u32>,

        /// isolated (worktree) or direct (project checkout)
        #[arg(long, default_value = "isolated")]
        mode: BuildMode,

        /// Stop between sessions instead of continuing automatically
        #[arg(long)]
        no_auto_continue: bool,

        /// Skip QA after the build
        #[arg(long)]
        skip_qa: bool,
    },

    /// Start the background QA loop
    Qa { spec_id: String },

    /// Start background follow-up planning
    Followup { spec_id: String },

    /// Merge a finished build into the project
    Merge {
        spec_id: String,

        /// Stage the changes without committing
        #[arg(long)]
        no_commit: bool,
    },

    /// Delete a spec's worktree and branch
    Discard {
        spec_id: String,

        /// Required to actually delete anything
        #[arg(long)]
        confirm: bool,
    },

    /// Delete every spec worktree and branch
    Cleanup {
        /// Required to actually delete anything
        #[arg(long)]
        confirm: bool,
    },

    /// Print the tool catalogue
    Tools,

    /// Invoke a tool by name with JSON arguments
    Call {
        name: String,

        /// JSON object of arguments
        arguments: Option<String>,
    },

    /// Answer one JSON tool request per stdin line
    Serve,
}

/// One line of `serve` input.
#[derive(Debug, Deserialize)]
struct ToolRequest {
    name: String,
    #[serde(default)]
    arguments: Value,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env may carry AUTOSPEC_DEBUG and the model overrides.
    let dotenv = dotenvy::dotenv();
    autospec::log::init_with_debug(cli.debug);
    if let Ok(path) = dotenv {
        alog_debug!("Loaded environment from {}", path.display());
    }
    alog!("autospec starting: {:?}", cli.command);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let orchestrator = Orchestrator::new(config, ModelOverrides::from_env());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli, orchestrator))
}

async fn run(cli: Cli, orchestrator: Orchestrator) -> Result<()> {
    let project_dir = cli.project_dir;
    let spec = |spec_id: String| SpecArgs {
        spec_id,
        project_dir: project_dir.clone(),
    };

    let call = match cli.command {
        Command::Tools => return print_json(&serde_json::to_value(tool_definitions())?),
        Command::Serve => return serve(&orchestrator).await,
        Command::Call { name, arguments } => {
            let mut arguments: Value = match arguments {
                Some(raw) => serde_json::from_str(&raw)?,
                None => json!({}),
            };
            if let (Some(dir), Some(obj)) = (&project_dir, arguments.as_object_mut()) {
                obj.entry("project_dir").or_insert_with(|| json!(dir));
            }
            return print_json(&orchestrator.call_tool(&name, arguments).await);
        }
        Command::List => ToolCall::ListSpecs(ProjectArgs {
            project_dir: project_dir.clone(),
        }),
        Command::Status { spec_id } => ToolCall::GetSpecStatus(spec(spec_id)),
        Command::QaStatus { spec_id } => ToolCall::GetQaStatus(spec(spec_id)),
        Command::Review { spec_id } => ToolCall::ReviewBuild(spec(spec_id)),
        Command::Worktrees => ToolCall::ListWorktrees(ProjectArgs {
            project_dir: project_dir.clone(),
        }),
        Command::Preview { spec_id } => ToolCall::MergePreview(spec(spec_id)),
        Command::Build {
            spec_id,
            model,
            max_iterations,
            mode,
            no_auto_continue,
            skip_qa,
        } => ToolCall::RunBuild(BuildArgs {
            spec_id,
            project_dir: project_dir.clone(),
            model,
            max_iterations,
            mode,
            auto_continue: Some(!no_auto_continue),
            skip_qa,
        }),
        Command::Qa { spec_id } => ToolCall::RunQa(spec(spec_id)),
        Command::Followup { spec_id } => ToolCall::RunFollowup(spec(spec_id)),
        Command::Merge { spec_id, no_commit } => ToolCall::MergeBuild(MergeArgs {
            spec_id,
            project_dir: project_dir.clone(),
            no_commit,
        }),
        Command::Discard { spec_id, confirm } => ToolCall::DiscardBuild(DiscardArgs {
            spec_id,
            project_dir: project_dir.clone(),
            confirm,
        }),
        Command::Cleanup { confirm } => ToolCall::CleanupWorktrees(CleanupArgs {
            project_dir: project_dir.clone(),
            confirm,
        }),
    };

    print_json(&orchestrator.execute(call).await?)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Line-delimited JSON: one request in, one result out, until stdin closes.
async fn serve(orchestrator: &Orchestrator) -> Result<()> {
    alog!("Serving tool requests on stdio");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ToolRequest>(&line) {
            Ok(request) => orchestrator.call_tool(&request.name, request.arguments).await,
            Err(e) => {
                alog_warn!("Rejected request line: {}", e);
                json!({"error": format!("Invalid request: {}", e)})
            }
        };
        let mut out = serde_json::to_string(&response).map_err(Error::from)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }

    alog!("stdin closed, exiting");
    Ok(())
}
