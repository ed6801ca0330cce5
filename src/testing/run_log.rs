//! Run logging
//!
//! Each suite invocation owns one [`RunContext`] and one directory
//! `<logs root>/test_run_<run_id>/` holding:
//!
//! - `result.log`: one summary line per test, in execution order
//! - `NNN_<name>.log`: full detail for each test
//! - `summary.json`: machine-readable totals, written when the run finishes

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use crate::common::{paths, Error, Result};

use super::descriptor::TestDescriptor;
use super::evaluator::Verdict;
use super::runner::CapturedOutcome;
use super::suite::CaseResult;

/// Name of the per-run summary log
pub const RESULT_LOG: &str = "result.log";

/// Name of the machine-readable run summary
pub const SUMMARY_JSON: &str = "summary.json";

const SEPARATOR: &str = "==================================================";

/// State for one suite invocation
///
/// The log directory is created on first use and is never shared with
/// another run: if the timestamped name is already taken a numeric suffix is
/// added.
#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    logs_root: PathBuf,
    log_directory: PathBuf,
    started_at: DateTime<Local>,
    created: bool,
}

impl RunContext {
    pub(crate) fn new(logs_root: &Path) -> Self {
        let started_at = Local::now();
        let run_id = started_at.format("%Y%m%d_%H%M%S_%3f").to_string();
        Self {
            log_directory: run_directory(logs_root, &run_id),
            run_id,
            logs_root: logs_root.to_path_buf(),
            started_at,
            created: false,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log_directory(&self) -> &Path {
        &self.log_directory
    }

    pub fn result_log(&self) -> PathBuf {
        self.log_directory.join(RESULT_LOG)
    }

    /// Create the run directory and an empty `result.log`, once
    fn ensure_directory(&mut self) -> Result<()> {
        if self.created {
            return Ok(());
        }

        fs::create_dir_all(&self.logs_root).map_err(|e| Error::log_write(&self.logs_root, e))?;

        let base = self.run_id.clone();
        let mut attempt = 0u32;
        loop {
            match fs::create_dir(&self.log_directory) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < 1000 => {
                    attempt += 1;
                    self.run_id = format!("{}_{}", base, attempt);
                    self.log_directory = run_directory(&self.logs_root, &self.run_id);
                }
                Err(e) => return Err(Error::log_write(&self.log_directory, e)),
            }
        }

        let result_log = self.result_log();
        fs::File::create(&result_log).map_err(|e| Error::log_write(&result_log, e))?;

        self.created = true;
        tracing::info!(directory = %self.log_directory.display(), "Test logs will be saved here");
        Ok(())
    }
}

fn run_directory(logs_root: &Path, run_id: &str) -> PathBuf {
    logs_root.join(format!("test_run_{}", run_id))
}

/// Persist one test's outcome and verdict
///
/// Writes the per-test detail file and appends one line to `result.log`.
/// Returns the path of the detail file.
pub fn record(
    descriptor: &TestDescriptor,
    outcome: &CapturedOutcome,
    verdict: &Verdict,
    context: &mut RunContext,
) -> Result<PathBuf> {
    context.ensure_directory()?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

    let detail_path = context.log_directory.join(format!(
        "{:03}_{}.log",
        descriptor.index,
        paths::sanitize_file_name(&descriptor.name)
    ));
    fs::write(&detail_path, detail_entry(descriptor, outcome, verdict, &timestamp))
        .map_err(|e| Error::log_write(&detail_path, e))?;

    let result_log = context.result_log();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&result_log)
        .map_err(|e| Error::log_write(&result_log, e))?;
    file.write_all(summary_line(descriptor, outcome, verdict, &timestamp).as_bytes())
        .map_err(|e| Error::log_write(&result_log, e))?;

    Ok(detail_path)
}

/// Machine-readable record of a finished run
#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    run_id: &'a str,
    started_at: String,
    finished_at: String,
    total: usize,
    passed: usize,
    failed: usize,
    results: &'a [CaseResult],
}

/// Write `summary.json` for a finished run
pub fn finish(results: &[CaseResult], context: &mut RunContext) -> Result<PathBuf> {
    context.ensure_directory()?;

    let passed = results.iter().filter(|r| r.verdict.passed).count();
    let summary = RunSummary {
        run_id: &context.run_id,
        started_at: context.started_at.to_rfc3339(),
        finished_at: Local::now().to_rfc3339(),
        total: results.len(),
        passed,
        failed: results.len() - passed,
        results,
    };

    let path = context.log_directory.join(SUMMARY_JSON);
    let json = serde_json::to_string_pretty(&summary)?;
    fs::write(&path, json).map_err(|e| Error::log_write(&path, e))?;
    Ok(path)
}

fn summary_line(
    descriptor: &TestDescriptor,
    outcome: &CapturedOutcome,
    verdict: &Verdict,
    timestamp: &str,
) -> String {
    let mut line = format!(
        "[{}] {}: {} ({:.2}s)",
        timestamp,
        verdict.status_label(),
        single_line(&descriptor.name),
        outcome.duration.as_secs_f64()
    );
    if let Some(reason) = verdict.failure_reasons.first() {
        let _ = write!(line, " - {}", single_line(reason));
    }
    line.push('\n');
    line
}

fn detail_entry(
    descriptor: &TestDescriptor,
    outcome: &CapturedOutcome,
    verdict: &Verdict,
    timestamp: &str,
) -> String {
    let stdout = outcome.stdout_text();
    let stderr = outcome.stderr_text();

    let mut entry = String::new();
    let _ = writeln!(entry, "Test: {}", descriptor.name);
    let _ = writeln!(entry, "Script: {}", descriptor.script_path.display());
    let _ = writeln!(entry, "Timestamp: {}", timestamp);
    let _ = writeln!(entry, "Status: {}", verdict.status_label());
    let _ = writeln!(entry, "Expected Success: {}", descriptor.expected_success);
    let _ = writeln!(entry, "Exit Code: {}", outcome.exit);
    if let Some(reason) = outcome.launch_error() {
        let _ = writeln!(entry, "Launch Error: {}", reason);
    }
    let _ = writeln!(
        entry,
        "Execution Time: {:.2} seconds",
        outcome.duration.as_secs_f64()
    );
    let _ = writeln!(
        entry,
        "\nSTDOUT:\n{}",
        if stdout.is_empty() { "(no output)" } else { &*stdout }
    );
    let _ = writeln!(
        entry,
        "STDERR:\n{}",
        if stderr.is_empty() { "(no errors)" } else { &*stderr }
    );
    if !verdict.passed {
        let _ = writeln!(entry, "FAILURE REASONS:");
        for reason in &verdict.failure_reasons {
            let _ = writeln!(entry, "- {}", reason);
        }
        entry.push('\n');
    }
    entry.push_str(SEPARATOR);
    entry.push('\n');
    entry
}

fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}
