//! autospec: status tracking, phase configuration and worktree lifecycle for
//! autonomous multi-phase spec builds.
//!
//! The [`api::Orchestrator`] is the entry point; the modules below it are
//! usable on their own.

pub mod api;
pub mod config;
pub mod error;
pub mod git;
pub mod jobs;
pub mod log;
pub mod phase_config;
pub mod plan;
pub mod status;
pub mod util;
pub mod worktree;

pub use api::Orchestrator;
pub use error::{Error, Result};
