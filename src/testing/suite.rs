//! Suite orchestration
//!
//! A [`Suite`] owns the loaded descriptors and hands each one out as a
//! [`TestUnit`]: a self-contained unit of work that runs the script,
//! evaluates the outcome and records it. Adapters (the CLI, or any other test
//! framework) decide which units to run and when to stop; [`Suite::run_suite`]
//! simply runs them all.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::common::{Result, Settings};

use super::descriptor::{load_descriptors, TestDescriptor};
use super::evaluator::{evaluate, Verdict};
use super::run_log::{self, RunContext};
use super::runner::{CapturedOutcome, ExitStatus, ProcessRunner};

/// Lifecycle of a single test case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseState {
    Pending,
    Running,
    Completed,
    TimedOut,
    LaunchFailed,
    Evaluated,
    Logged,
}

impl CaseState {
    /// The state a finished run lands in
    fn after_run(outcome: &CapturedOutcome) -> Self {
        match outcome.exit {
            ExitStatus::TimedOut => CaseState::TimedOut,
            ExitStatus::LaunchFailed { .. } => CaseState::LaunchFailed,
            ExitStatus::Code { .. } | ExitStatus::Signal { .. } => CaseState::Completed,
        }
    }
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaseState::Pending => "PENDING",
            CaseState::Running => "RUNNING",
            CaseState::Completed => "COMPLETED",
            CaseState::TimedOut => "TIMED_OUT",
            CaseState::LaunchFailed => "LAUNCH_FAILED",
            CaseState::Evaluated => "EVALUATED",
            CaseState::Logged => "LOGGED",
        };
        f.write_str(s)
    }
}

/// Result of running one test case
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub index: usize,
    pub name: String,
    pub script_path: PathBuf,
    pub exit: ExitStatus,
    pub duration_secs: f64,
    pub verdict: Verdict,
    /// Detail log, if it could be written
    pub log_file: Option<PathBuf>,
    #[serde(skip)]
    pub outcome: CapturedOutcome,
}

impl CaseResult {
    pub fn passed(&self) -> bool {
        self.verdict.passed
    }
}

/// Aggregated result of a suite run
#[derive(Debug, Clone, Serialize)]
pub struct SuiteResult {
    pub run_id: String,
    pub log_directory: PathBuf,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<CaseResult>,
}

impl SuiteResult {
    fn new(results: Vec<CaseResult>, context: &RunContext) -> Self {
        let passed = results.iter().filter(|r| r.passed()).count();
        Self {
            run_id: context.run_id().to_string(),
            log_directory: context.log_directory().to_path_buf(),
            total: results.len(),
            passed,
            failed: results.len() - passed,
            results,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn verdicts(&self) -> impl Iterator<Item = &Verdict> {
        self.results.iter().map(|r| &r.verdict)
    }
}

/// A loaded, validated test suite
#[derive(Debug)]
pub struct Suite {
    settings: Settings,
    descriptors: Vec<TestDescriptor>,
    runner: ProcessRunner,
}

impl Suite {
    /// Load the test-case file; any configuration error aborts here, before
    /// anything runs
    pub fn load(path: &Path, settings: Settings) -> Result<Self> {
        let descriptors = load_descriptors(path, &settings)?;
        Ok(Self::new(descriptors, settings))
    }

    pub fn new(descriptors: Vec<TestDescriptor>, settings: Settings) -> Self {
        let runner = ProcessRunner::new(&settings);
        Self {
            settings,
            descriptors,
            runner,
        }
    }

    pub fn descriptors(&self) -> &[TestDescriptor] {
        &self.descriptors
    }

    /// One unit of work per descriptor, in declaration order
    pub fn units(&self) -> Vec<TestUnit<'_>> {
        self.descriptors
            .iter()
            .map(|descriptor| TestUnit {
                descriptor,
                runner: &self.runner,
            })
            .collect()
    }

    /// Begin a run; the returned context is passed to every unit
    pub fn start_run(&self) -> RunContext {
        RunContext::new(&self.settings.logs_dir)
    }

    /// Write the run summary and aggregate the results
    pub fn finish(&self, results: Vec<CaseResult>, context: &mut RunContext) -> SuiteResult {
        if let Err(e) = run_log::finish(&results, context) {
            tracing::warn!(error = %e, "Failed to write run summary");
        }
        SuiteResult::new(results, context)
    }

    /// Run every test case sequentially and aggregate the verdicts
    pub async fn run_suite(&self) -> SuiteResult {
        let mut context = self.start_run();
        let mut results = Vec::with_capacity(self.descriptors.len());
        for unit in self.units() {
            results.push(unit.run(&mut context).await);
        }
        self.finish(results, &mut context)
    }
}

/// A single runnable test case
#[derive(Debug, Clone, Copy)]
pub struct TestUnit<'a> {
    descriptor: &'a TestDescriptor,
    runner: &'a ProcessRunner,
}

impl TestUnit<'_> {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Run, evaluate and record this test case
    ///
    /// Never fails: launch problems and timeouts end up in the verdict, and
    /// log write failures are reported without touching it.
    pub async fn run(&self, context: &mut RunContext) -> CaseResult {
        let descriptor = self.descriptor;
        let name = descriptor.name.as_str();
        tracing::debug!(test = name, state = %CaseState::Pending);

        tracing::debug!(test = name, state = %CaseState::Running, script = %descriptor.script_path.display());
        let outcome = self.runner.run(descriptor).await;
        tracing::debug!(test = name, state = %CaseState::after_run(&outcome), exit = %outcome.exit);

        let verdict = evaluate(descriptor, &outcome);
        tracing::debug!(test = name, state = %CaseState::Evaluated, passed = verdict.passed);

        let log_file = match run_log::record(descriptor, &outcome, &verdict, context) {
            Ok(path) => {
                tracing::debug!(test = name, state = %CaseState::Logged);
                Some(path)
            }
            Err(e) => {
                tracing::warn!(test = name, error = %e, "Failed to write test log");
                None
            }
        };

        CaseResult {
            index: descriptor.index,
            name: descriptor.name.clone(),
            script_path: descriptor.script_path.clone(),
            exit: outcome.exit.clone(),
            duration_secs: outcome.duration.as_secs_f64(),
            verdict,
            log_file,
            outcome,
        }
    }
}
