//! scriptcheck - declarative regression tests for shell scripts
//!
//! Runs every script listed in a JSON test-case file, checks exit status and
//! output against the declared expectations, and writes per-run logs.

use clap::Parser;
use scriptcheck::{cli, common::logging, Commands};

#[derive(Parser)]
#[command(name = "scriptcheck", about = "Run and validate shell script test suites")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Run { verbose: true, .. });
    logging::init_cli(verbose);

    match cli::dispatch(cli.command).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
