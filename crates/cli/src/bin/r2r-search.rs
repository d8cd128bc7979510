use clap::Parser;
use owo_colors::OwoColorize as _;
use r2r_cli::search::{SearchArgs, run};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    r2r_cli::init_logging();
    match run(SearchArgs::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red());
            ExitCode::FAILURE
        }
    }
}
