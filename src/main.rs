mod cli;
mod dispatch;

use clap::Parser;
use cli::Cli;
use dispatch::{error_exit_code, EXIT_USAGE};
use harvest_core::{ErrorReporter, HarvestError};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str =
    "harvest=info,harvest_core=info,harvest_client=info,harvest_platforms=info,report_writer=info";
const VERBOSE_FILTER: &str =
    "harvest=debug,harvest_core=debug,harvest_client=debug,harvest_platforms=debug,report_writer=debug";

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging(cli.verbose);
    let platform = cli.platform();
    let command = cli.command_kind();
    tracing::debug!("Running {} {}", platform.slug(), command);

    let result = tokio::select! {
        result = dispatch::run(&cli) => result,
        _ = interrupted() => Err(HarvestError::Interrupted),
    };

    match result {
        Ok(outcome) => {
            println!("Wrote {} records to: {}", outcome.records, outcome.path.display());
            if !outcome.failed_sections.is_empty() {
                eprintln!(
                    "Warning: partial report, failed sections: {}",
                    outcome.failed_sections.join(", ")
                );
            }
            ExitCode::from(outcome.exit_code())
        }
        Err(error) => {
            let reporter = ErrorReporter::new().with_error_reporting(cli.verbose);
            reporter.report_error(platform, command, &error);
            eprintln!("Error: {}", reporter.describe_failure(platform, command, &error));
            ExitCode::from(error_exit_code(&error))
        }
    }
}
