//! Script test engine
//!
//! Runs declaratively described shell-script tests: each descriptor is
//! executed by the [`ProcessRunner`], judged by [`evaluate`] and persisted by
//! the run log. Every per-test failure is reported as data in a [`Verdict`];
//! only a broken test-case file is an error.

mod descriptor;
mod evaluator;
pub mod run_log;
mod runner;
mod suite;

pub use descriptor::*;
pub use evaluator::{evaluate, Verdict, TIMEOUT_REASON};
pub use run_log::RunContext;
pub use runner::{CapturedOutcome, ExitStatus, ProcessRunner};
pub use suite::{CaseResult, CaseState, Suite, SuiteResult, TestUnit};
