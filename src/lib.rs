//! scriptcheck - declarative regression tests for shell scripts
//!
//! This library runs external scripts under a time budget, validates their
//! exit status and output against a JSON description, and keeps
//! human-readable and machine-readable logs of every run.

pub mod cli;
pub mod commands;
pub mod common;
pub mod testing;

// Re-export commonly used types for tests
pub use commands::Commands;
pub use common::{Error, Result, Settings};
pub use testing::{evaluate, CapturedOutcome, ExitStatus, Suite, SuiteResult, TestDescriptor, Verdict};
