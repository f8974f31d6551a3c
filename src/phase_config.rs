//! Model and thinking-tier selection per execution phase.
//!
//! Model precedence, first hit wins:
//! 1. process-wide primary override (`AUTO_BUILD_MODEL`, else `ANTHROPIC_MODEL`)
//! 2. explicit per-call model
//! 3. auto profile `phaseModels` entry (or the phase default)
//! 4. single `model` from task metadata
//! 5. phase default
//!
//! Thinking has no environment step: explicit tier, auto profile
//! `phaseThinking`, single `thinkingLevel`, phase default.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::plan::TaskMetadata;
use crate::util::non_empty;
use crate::{alog_debug, alog_warn};

pub const PRIMARY_MODEL_ENV: &str = "AUTO_BUILD_MODEL";
pub const FALLBACK_MODEL_ENV: &str = "ANTHROPIC_MODEL";
pub const FAST_MODEL_ENV: &str = "ANTHROPIC_SMALL_FAST_MODEL";

/// Shorthand names and the identifiers they stand for.
pub const DEFAULT_MODEL_IDS: [(&str, &str); 3] = [
    ("opus", "claude-opus-4-5-20251101"),
    ("sonnet", "claude-sonnet-4-5-20250929"),
    ("haiku", "claude-haiku-4-5-20251001"),
];

/// Long-form identifiers that an override also replaces.
const WELL_KNOWN_MODEL_IDS: [&str; 14] = [
    "claude-3-5-sonnet-latest",
    "claude-3-5-sonnet-20241022",
    "claude-sonnet-4-5-latest",
    "claude-sonnet-4-5-20250929",
    "claude-3-5-haiku-latest",
    "claude-3-5-haiku-20241022",
    "claude-haiku-4-5-latest",
    "claude-haiku-4-5-20251001",
    "claude-3-opus-latest",
    "claude-3-opus-20240229",
    "claude-opus-4-5-latest",
    "claude-opus-4-5-20251101",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
];

/// Process-wide model overrides and the resolution table derived from them.
///
/// Built once at startup and passed by reference; nothing else reads the
/// model environment variables.
#[derive(Debug, Clone)]
pub struct ModelOverrides {
    primary: Option<String>,
    fast: Option<String>,
    table: HashMap<String, String>,
}

impl Default for ModelOverrides {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl ModelOverrides {
    /// `fast` falls back to `primary` when unset.
    pub fn new(primary: Option<String>, fast: Option<String>) -> Self {
        let primary = primary.filter(|m| !m.is_empty());
        let fast = fast.filter(|m| !m.is_empty()).or_else(|| primary.clone());

        let mut table: HashMap<String, String> = DEFAULT_MODEL_IDS
            .iter()
            .map(|(short, full)| (short.to_string(), full.to_string()))
            .collect();

        if let Some(primary) = &primary {
            table.insert("opus".to_string(), primary.clone());
            table.insert("sonnet".to_string(), primary.clone());
            for id in WELL_KNOWN_MODEL_IDS.iter().filter(|id| !id.contains("haiku")) {
                table.insert(id.to_string(), primary.clone());
            }
        }
        if let Some(fast) = &fast {
            table.insert("haiku".to_string(), fast.clone());
            for id in WELL_KNOWN_MODEL_IDS.iter().filter(|id| id.contains("haiku")) {
                table.insert(id.to_string(), fast.clone());
            }
        }

        Self {
            primary,
            fast,
            table,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let primary = var(PRIMARY_MODEL_ENV).or_else(|| var(FALLBACK_MODEL_ENV));
        let overrides = Self::new(primary, var(FAST_MODEL_ENV));
        if overrides.primary().is_some() || overrides.fast().is_some() {
            alog_debug!(
                "Model overrides: primary={:?}, fast={:?}",
                overrides.primary(),
                overrides.fast()
            );
        }
        overrides
    }

    pub fn primary(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    pub fn fast(&self) -> Option<&str> {
        self.fast.as_deref()
    }

    /// Map a shorthand or long-form id through the table. Unknown ids pass
    /// through unchanged.
    pub fn resolve_model_id(&self, model: &str) -> String {
        if model.is_empty() {
            return String::new();
        }
        self.table
            .get(&model.to_lowercase())
            .cloned()
            .unwrap_or_else(|| model.to_string())
    }
}

/// Reasoning depth, ordered from none to deepest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingTier {
    None,
    Low,
    Medium,
    High,
    Ultrathink,
}

impl ThinkingTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingTier::None => "none",
            ThinkingTier::Low => "low",
            ThinkingTier::Medium => "medium",
            ThinkingTier::High => "high",
            ThinkingTier::Ultrathink => "ultrathink",
        }
    }

    /// Token budget; `None` means thinking disabled.
    pub fn budget(&self) -> Option<u32> {
        match self {
            ThinkingTier::None => None,
            ThinkingTier::Low => Some(1024),
            ThinkingTier::Medium => Some(4096),
            ThinkingTier::High => Some(16384),
            ThinkingTier::Ultrathink => Some(65536),
        }
    }

    /// Unknown names warn and read as `Medium`.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| {
            alog_warn!("Unknown thinking level '{}', using medium", s);
            ThinkingTier::Medium
        })
    }
}

impl FromStr for ThinkingTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(ThinkingTier::None),
            "low" => Ok(ThinkingTier::Low),
            "medium" => Ok(ThinkingTier::Medium),
            "high" => Ok(ThinkingTier::High),
            "ultrathink" => Ok(ThinkingTier::Ultrathink),
            other => Err(format!("unknown thinking level '{}'", other)),
        }
    }
}

impl fmt::Display for ThinkingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn get_thinking_budget(level: &str) -> Option<u32> {
    ThinkingTier::parse_lenient(level).budget()
}

/// Budget for a sub-phase of the spec-writing pipeline.
pub fn spec_phase_thinking_budget(phase_name: &str) -> Option<u32> {
    let tier = match phase_name {
        "discovery" | "spec_writing" | "self_critique" => ThinkingTier::Ultrathink,
        _ => ThinkingTier::Medium,
    };
    tier.budget()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPhase {
    Spec,
    Planning,
    Coding,
    Qa,
}

impl ExecutionPhase {
    pub const ALL: [ExecutionPhase; 4] = [
        ExecutionPhase::Spec,
        ExecutionPhase::Planning,
        ExecutionPhase::Coding,
        ExecutionPhase::Qa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPhase::Spec => "spec",
            ExecutionPhase::Planning => "planning",
            ExecutionPhase::Coding => "coding",
            ExecutionPhase::Qa => "qa",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ExecutionPhase::Planning => "opus",
            _ => "sonnet",
        }
    }

    pub fn default_thinking(&self) -> ThinkingTier {
        match self {
            ExecutionPhase::Planning | ExecutionPhase::Qa => ThinkingTier::High,
            _ => ThinkingTier::Medium,
        }
    }
}

impl FromStr for ExecutionPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown phase '{}'", s))
    }
}

/// Everything a job needs to know about one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseConfig {
    pub model: String,
    pub thinking: ThinkingTier,
    pub budget: Option<u32>,
}

pub struct PhaseConfigResolver<'a> {
    overrides: &'a ModelOverrides,
}

impl<'a> PhaseConfigResolver<'a> {
    pub fn new(overrides: &'a ModelOverrides) -> Self {
        Self { overrides }
    }

    pub fn phase_model(
        &self,
        spec_dir: &Path,
        phase: ExecutionPhase,
        cli_model: Option<&str>,
    ) -> String {
        self.phase_model_with(TaskMetadata::load(spec_dir).as_ref(), phase, cli_model)
    }

    pub fn phase_model_with(
        &self,
        metadata: Option<&TaskMetadata>,
        phase: ExecutionPhase,
        cli_model: Option<&str>,
    ) -> String {
        let chosen = self
            .overrides
            .primary()
            .or_else(|| non_empty(cli_model))
            .or_else(|| {
                metadata.and_then(|m| match m.auto_phase_models() {
                    Some(models) => Some(
                        non_empty(models.get(phase.as_str()).map(String::as_str))
                            .unwrap_or(phase.default_model()),
                    ),
                    None => m.single_model(),
                })
            })
            .unwrap_or(phase.default_model());
        self.overrides.resolve_model_id(chosen)
    }

    pub fn phase_thinking(
        &self,
        spec_dir: &Path,
        phase: ExecutionPhase,
        cli_thinking: Option<&str>,
    ) -> ThinkingTier {
        self.phase_thinking_with(TaskMetadata::load(spec_dir).as_ref(), phase, cli_thinking)
    }

    pub fn phase_thinking_with(
        &self,
        metadata: Option<&TaskMetadata>,
        phase: ExecutionPhase,
        cli_thinking: Option<&str>,
    ) -> ThinkingTier {
        if let Some(level) = non_empty(cli_thinking) {
            return ThinkingTier::parse_lenient(level);
        }
        let declared = metadata.and_then(|m| match m.auto_phase_thinking() {
            Some(levels) => Some(
                non_empty(levels.get(phase.as_str()).map(String::as_str))
                    .map(ThinkingTier::parse_lenient)
                    .unwrap_or(phase.default_thinking()),
            ),
            None => m.single_thinking().map(ThinkingTier::parse_lenient),
        });
        declared.unwrap_or(phase.default_thinking())
    }

    pub fn phase_config(
        &self,
        spec_dir: &Path,
        phase: ExecutionPhase,
        cli_model: Option<&str>,
        cli_thinking: Option<&str>,
    ) -> PhaseConfig {
        let metadata = TaskMetadata::load(spec_dir);
        self.phase_config_with(metadata.as_ref(), phase, cli_model, cli_thinking)
    }

    pub fn phase_config_with(
        &self,
        metadata: Option<&TaskMetadata>,
        phase: ExecutionPhase,
        cli_model: Option<&str>,
        cli_thinking: Option<&str>,
    ) -> PhaseConfig {
        let model = self.phase_model_with(metadata, phase, cli_model);
        let thinking = self.phase_thinking_with(metadata, phase, cli_thinking);
        alog_debug!(
            "phase={} model={} thinking={}",
            phase.as_str(),
            model,
            thinking
        );
        PhaseConfig {
            model,
            thinking,
            budget: thinking.budget(),
        }
    }
}
