//! Shared test utilities for docshift integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs with a temp storage root and an
//!   in-memory database
//! - `ScriptedRunner`, a `ToolRunner` that plays back scripted outcomes
//!   instead of launching external programs

pub mod harness;
pub mod runner;

pub use harness::TestHarness;
pub use runner::{Behavior, ScriptedRunner};
