use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{alog_debug, Error, Result};

const DEFAULT_TOOL_DIR: &str = "auto-claude";
const DEFAULT_TRUNK_BRANCH: &str = "main";
const DEFAULT_RUNNER: &str = "python3 run.py";
const DEFAULT_MERGE_TIMEOUT_SECS: u64 = 60;

/// Environment variable naming the default project root.
pub const PROJECT_DIR_ENV: &str = "AUTO_CLAUDE_PROJECT_DIR";

/// Settings read from `~/.autospec/autospec.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Name of the per-project state directory (`.<tool_dir>/specs`).
    pub tool_dir: Option<String>,
    /// Branch that spec branches are merged into.
    pub trunk_branch: Option<String>,
    /// Command prefix of the external execution engine.
    pub runner: Option<String>,
    pub merge_timeout_secs: Option<u64>,
    /// Project root used when neither the caller nor the environment names one.
    pub project_dir: Option<String>,
}

impl Config {
    pub fn autospec_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".autospec"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::autospec_dir()?.join("autospec.toml"))
    }

    pub fn effective_tool_dir(&self) -> &str {
        self.tool_dir.as_deref().unwrap_or(DEFAULT_TOOL_DIR)
    }

    pub fn effective_trunk_branch(&self) -> &str {
        self.trunk_branch.as_deref().unwrap_or(DEFAULT_TRUNK_BRANCH)
    }

    pub fn effective_runner(&self) -> &str {
        self.runner.as_deref().unwrap_or(DEFAULT_RUNNER)
    }

    /// The runner command split into program and leading arguments.
    pub fn runner_argv(&self) -> Vec<String> {
        self.effective_runner()
            .split_whitespace()
            .map(String::from)
            .collect()
    }

    pub fn merge_timeout(&self) -> Duration {
        Duration::from_secs(
            self.merge_timeout_secs
                .unwrap_or(DEFAULT_MERGE_TIMEOUT_SECS),
        )
    }

    /// Resolve the project root: explicit argument, then
    /// `AUTO_CLAUDE_PROJECT_DIR`, then the configured default, then the
    /// current directory.
    pub fn project_root(&self, explicit: Option<&str>) -> PathBuf {
        if let Some(dir) = explicit.filter(|d| !d.is_empty()) {
            return expand_tilde(dir);
        }
        if let Some(dir) = std::env::var(PROJECT_DIR_ENV).ok().filter(|d| !d.is_empty()) {
            return expand_tilde(&dir);
        }
        if let Some(dir) = &self.project_dir {
            return expand_tilde(dir);
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        alog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            alog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        alog_debug!(
            "Config loaded: tool_dir={:?}, trunk={:?}, runner={:?}, merge_timeout={:?}",
            config.tool_dir,
            config.trunk_branch,
            config.runner,
            config.merge_timeout_secs
        );
        Ok(config)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
