use clap::Parser;
use r2r_mcp_server::{ServerArgs, TransportKind, build_server, logging, transport};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = ServerArgs::parse();
    if let Err(e) = logging::init(&args.log_level, args.debug, args.log_format) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "server exited with an error");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: ServerArgs) -> anyhow::Result<()> {
    let server = build_server(&args).await?;
    match args.transport {
        TransportKind::Stdio => transport::serve_stdio(server).await,
        TransportKind::Http => transport::serve_http(server, args.bind).await,
    }
}
