//! CLI command definitions
//!
//! Defines the clap commands for the scriptcheck CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::common::paths::DEFAULT_TESTCASE_FILE;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the test cases and print a pass/fail report
    Run {
        #[command(flatten)]
        suite: SuiteArgs,

        /// Only run tests whose name contains this text (repeatable)
        #[arg(long, short)]
        filter: Vec<String>,

        /// Match --filter against the whole test name
        #[arg(long, requires = "filter")]
        exact: bool,

        /// Stop after the first failing test
        #[arg(long, short = 'x')]
        fail_fast: bool,

        /// Also write the machine-readable JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Show stdout/stderr of failing tests
        #[arg(long, short)]
        verbose: bool,
    },

    /// List the test names that `run` would execute
    List {
        #[command(flatten)]
        suite: SuiteArgs,
    },
}

/// Options shared by every command that loads a suite
#[derive(Args, Debug, Clone)]
pub struct SuiteArgs {
    /// Path to the JSON test-case file
    #[arg(default_value = DEFAULT_TESTCASE_FILE)]
    pub testcases: PathBuf,

    /// Project root for relative script paths (default: the test-case file's directory)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Configuration file (default: <root>/scriptcheck.toml, then the user config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Default timeout in seconds for tests that don't set one
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Directory to create run logs in
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,

    /// Run scripts through this interpreter (e.g. bash) instead of executing them
    #[arg(long)]
    pub interpreter: Option<String>,
}
