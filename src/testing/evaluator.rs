//! Outcome evaluation
//!
//! Compares a [`CapturedOutcome`] against a descriptor's expectations. Every
//! check runs, so the verdict lists all the ways a test failed rather than
//! just the first one.
//!
//! Output checks look at stdout only. The reference-file check is an exact
//! byte comparison: no trimming, no newline normalisation.

use serde::Serialize;

use super::descriptor::TestDescriptor;
use super::runner::{CapturedOutcome, ExitStatus};

/// Reason recorded when a script is killed for running too long
pub const TIMEOUT_REASON: &str = "timeout exceeded";

/// Pass/fail judgment for one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    /// Human-readable reasons; empty iff `passed`
    pub failure_reasons: Vec<String>,
}

impl Verdict {
    fn from_reasons(failure_reasons: Vec<String>) -> Self {
        Self {
            passed: failure_reasons.is_empty(),
            failure_reasons,
        }
    }

    pub fn status_label(&self) -> &'static str {
        if self.passed {
            "PASSED"
        } else {
            "FAILED"
        }
    }
}

/// Judge an outcome against the descriptor's expectations
pub fn evaluate(descriptor: &TestDescriptor, outcome: &CapturedOutcome) -> Verdict {
    let mut reasons = Vec::new();

    match &outcome.exit {
        ExitStatus::TimedOut => reasons.push(TIMEOUT_REASON.to_string()),
        ExitStatus::LaunchFailed { reason } => reasons.push(format!("launch failed: {}", reason)),
        ExitStatus::Code { .. } | ExitStatus::Signal { .. } => {}
    }

    let actual_success = outcome.exit.is_success();
    if actual_success != descriptor.expected_success {
        reasons.push(format!(
            "expected {} but script {} (exit code: {})",
            if descriptor.expected_success {
                "success"
            } else {
                "failure"
            },
            if actual_success {
                "succeeded"
            } else {
                "failed"
            },
            outcome.exit
        ));
    }

    if let Some(expected) = &descriptor.expected_output {
        if !contains(&outcome.stdout, expected.as_bytes()) {
            reasons.push(format!("expected output {:?} not found in stdout", expected));
        }
    }

    if let Some(path) = &descriptor.expected_result_file {
        match std::fs::read(path) {
            Ok(expected) => {
                if let Some(reason) = compare_exact(&expected, &outcome.stdout) {
                    reasons.push(format!(
                        "stdout does not match expected result file {}: {}",
                        path.display(),
                        reason
                    ));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                reasons.push(format!("expected result file {} not found", path.display()));
            }
            Err(e) => {
                reasons.push(format!(
                    "failed to read expected result file {}: {}",
                    path.display(),
                    e
                ));
            }
        }
    }

    Verdict::from_reasons(reasons)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

/// Describe how `actual` differs from `expected`, or `None` if identical
fn compare_exact(expected: &[u8], actual: &[u8]) -> Option<String> {
    if expected == actual {
        return None;
    }

    let offset = expected
        .iter()
        .zip(actual)
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| expected.len().min(actual.len()));

    Some(format!(
        "expected {} bytes, got {} bytes, first difference at byte {}",
        expected.len(),
        actual.len(),
        offset
    ))
}
