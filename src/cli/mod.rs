//! CLI command handling
//!
//! This is the test-framework adapter around the engine: it loads the suite,
//! picks which units to run (`--filter`), decides when to stop
//! (`--fail-fast`), exports reports and formats the console output.

use std::path::Path;

use colored::Colorize;

use crate::commands::{Commands, SuiteArgs};
use crate::common::config::{timeout_from_secs, MAX_TIMEOUT_SECS};
use crate::common::{paths, Config, Error, Result, Settings};
use crate::testing::{CaseResult, Suite, SuiteResult, TestUnit};

/// Dispatch a CLI command
///
/// Returns whether every executed test passed.
pub async fn dispatch(command: Commands) -> Result<bool> {
    match command {
        Commands::Run {
            suite,
            filter,
            exact,
            fail_fast,
            report,
            verbose,
        } => {
            let suite = load_suite(&suite)?;

            let units: Vec<TestUnit<'_>> = suite
                .units()
                .into_iter()
                .filter(|unit| matches_filter(unit.name(), &filter, exact))
                .collect();

            println!(
                "\n{} {} of {} test(s)",
                "Running".blue().bold(),
                units.len(),
                suite.descriptors().len()
            );

            let mut context = suite.start_run();
            let mut results = Vec::with_capacity(units.len());
            let planned = units.len();

            for unit in units {
                let case = unit.run(&mut context).await;
                print_case(&case, verbose);

                let failed = !case.passed();
                results.push(case);
                if fail_fast && failed {
                    println!(
                        "  {} stopping after first failure ({} not run)",
                        "!".yellow(),
                        planned - results.len()
                    );
                    break;
                }
            }

            let result = suite.finish(results, &mut context);
            print_summary(&result);

            if let Some(path) = report {
                write_report(&result, &path)?;
                println!("  Report: {}", path.display().to_string().dimmed());
            }

            Ok(result.all_passed())
        }

        Commands::List { suite } => {
            let suite = load_suite(&suite)?;
            for unit in suite.units() {
                println!("{}", unit.name());
            }
            Ok(true)
        }
    }
}

/// Resolve configuration and load the test-case file
fn load_suite(args: &SuiteArgs) -> Result<Suite> {
    let root = args
        .root
        .clone()
        .unwrap_or_else(|| paths::project_root_for(&args.testcases));

    let config = Config::load(args.config.as_deref(), &root)?;
    let mut settings = Settings::from_config(&config, &root)?;

    if let Some(secs) = args.timeout {
        settings.default_timeout = timeout_from_secs(secs).ok_or_else(|| {
            Error::Config(format!(
                "--timeout must be a positive number of at most {} seconds, got {}",
                MAX_TIMEOUT_SECS, secs
            ))
        })?;
    }
    if let Some(dir) = &args.logs_dir {
        settings.logs_dir = dir.clone();
    }
    if let Some(interpreter) = &args.interpreter {
        settings.interpreter = Some(interpreter.clone());
    }

    tracing::debug!(?settings, testcases = %args.testcases.display(), "Loading suite");
    Suite::load(&args.testcases, settings)
}

fn matches_filter(name: &str, filters: &[String], exact: bool) -> bool {
    filters.is_empty()
        || filters.iter().any(|f| {
            if exact {
                name == f
            } else {
                name.contains(f.as_str())
            }
        })
}

fn print_case(case: &CaseResult, verbose: bool) {
    if case.passed() {
        println!(
            "  {} {} {}",
            "✓".green(),
            case.name,
            format!("({:.2}s)", case.duration_secs).dimmed()
        );
        return;
    }

    println!(
        "  {} {} {}",
        "✗".red(),
        case.name.red(),
        format!("({:.2}s, exit: {})", case.duration_secs, case.exit).dimmed()
    );
    for reason in &case.verdict.failure_reasons {
        println!("      {}", reason);
    }

    if verbose {
        print_stream("stdout", &case.outcome.stdout_text());
        print_stream("stderr", &case.outcome.stderr_text());
        if let Some(log) = &case.log_file {
            println!("      {} {}", "log:".dimmed(), log.display());
        }
    }
}

fn print_stream(label: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    println!("      {}", format!("{}:", label).dimmed());
    for line in text.lines() {
        println!("        {}", line);
    }
}

fn print_summary(result: &SuiteResult) {
    let counts = format!(
        "{} passed, {} failed, {} total",
        result.passed, result.failed, result.total
    );

    if result.all_passed() {
        println!("\n{} {}", "✓".green().bold(), counts.green().bold());
    } else {
        println!("\n{} {}", "✗".red().bold(), counts.red().bold());
        for case in result.results.iter().filter(|c| !c.passed()) {
            println!("  {} {}", "FAILED".red(), case.name);
        }
    }
    println!(
        "  Logs: {}",
        result.log_directory.display().to_string().dimmed()
    );
}

fn write_report(result: &SuiteResult, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json).map_err(|e| Error::FileWrite {
        path: path.display().to_string(),
        error: e.to_string(),
    })
}
