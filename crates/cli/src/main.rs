mod args;
mod commands;
mod context;
mod output;

use std::process::ExitCode;

use clap::Parser;
use common::logging;

use crate::args::Cli;
use crate::context::AppContext;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(logging::default_level(cli.debug));

    let result = match AppContext::from_cli(&cli) {
        Ok(ctx) => commands::dispatch(&ctx, cli.command).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
