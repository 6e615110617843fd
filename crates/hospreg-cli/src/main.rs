use anyhow::Result;
use clap::Parser;
use hospreg_cli::cli_args::Cli;
use hospreg_core::{LoggingDestination, init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let destination = match &cli.global.data_dir {
        Some(dir) => LoggingDestination::DirectoryAndStderr(dir.join("logs")),
        None => LoggingDestination::FileAndStderr,
    };
    if let Err(err) = init_logging(destination) {
        eprintln!("Warning: logging unavailable: {err}");
    }

    hospreg_cli::run(cli).await
}
