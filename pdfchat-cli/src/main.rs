use std::process::ExitCode;

use clap::Parser;
use pdfchat_cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = pdfchat_telemetry::init_telemetry(&cli.settings.telemetry()) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match pdfchat_cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "pdfchat failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
