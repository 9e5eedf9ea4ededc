mod cli;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use sim_core::CompletionStatus;
use sim_domain::EventId;
use simflow_rust::{AppConfig, AppError, SolveRequest, SolveSession};
use tracing::{error, info};

use crate::cli::{CheckArgs, Cli, Commands, SolveArgs};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Solve(args) => solve(args).await,
        Commands::Check(args) => check(args),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn solve(args: SolveArgs) -> Result<bool, AppError> {
    let mut config = AppConfig::from_env()?;
    if args.max_processes.is_some() {
        config.max_processes = args.max_processes;
    }
    if args.strict {
        config.accept_unverified = false;
        config.accept_legacy = false;
    }

    let mut session = SolveSession::open(&args.model, config)?;
    let request = SolveRequest { event: args.event.map(EventId),
                                 batch: args.batch,
                                 recovery: args.recovery };
    let summary = session.solve(&request).await?;

    for done in &summary.completions {
        let line = match done.status {
            CompletionStatus::Succeeded => "done",
            CompletionStatus::UpToDate => "up to date",
            CompletionStatus::Prepared => "input prepared",
            CompletionStatus::Failed => "FAILED",
            CompletionStatus::NotExecutable => "NOT executable",
            CompletionStatus::Killed => "killed",
        };
        match &done.diagnostic {
            Some(d) => info!("{}: {line} ({d})", done.signature),
            None => info!("{}: {line}", done.signature),
        }
    }
    if summary.stalled {
        error!("some jobs could never start");
    }
    Ok(summary.succeeded())
}

fn check(args: CheckArgs) -> Result<bool, AppError> {
    let session = SolveSession::open(&args.model, AppConfig::from_env()?)?;
    match session.check() {
        Ok(()) => {
            info!("model '{}' is consistent", session.model().name);
            Ok(true)
        }
        Err(AppError::Inconsistent(problems)) => {
            for p in &problems {
                error!("  -> {p}");
            }
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
