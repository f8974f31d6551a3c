//! Integration test suite for autospec.
//!
//! These tests drive the public API against real temporary git projects.
//!
//! # Test Categories
//!
//! - `spec_status`: plan parsing, status derivation and QA results from disk
//! - `worktrees`: listing, review, merge preview, discard and cleanup on real worktrees
//! - `jobs`: launching and merging through stand-in engine scripts
//! - `tools`: JSON tool dispatch end to end
//!
//! # CI Compatibility
//!
//! The execution engine is replaced by small shell scripts, so no model or
//! network access is needed.


mod jobs;
mod spec_status;
mod tools;
mod worktrees;
