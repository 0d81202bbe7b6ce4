//! # pdfchat-cli
//!
//! The `pdfchat` command: `ingest` the documents directory into the vector
//! collection, `ask` a question from the terminal, or `serve` the HTTP API.
//!
//! Credentials come from `OPENAI_API_KEY`, `PINECONE_API_KEY` and
//! `PINECONE_ENVIRONMENT`, read from the environment or a `.env` file.

pub mod cli;
pub mod commands;
pub mod config;

use std::io::Write;

pub use cli::{Cli, Command, Settings};
pub use config::AppConfig;

/// Run one command to completion.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::from_settings(&cli.settings)?;
    tracing::debug!(?config, "resolved configuration");

    let pipeline = config.pipeline()?;
    let stdout = std::io::stdout();

    match cli.command {
        Command::Ingest => {
            let mut out = stdout.lock();
            commands::ingest(&pipeline, &config.directory_loader(), &mut out).await?;
            out.flush()?;
        }
        Command::Ask { question, no_stream } => {
            let chain = config.chain(pipeline);
            commands::ask(&chain, &question, no_stream, &mut stdout.lock()).await?;
        }
        Command::Serve { addr, max_upload_bytes } => {
            let state = commands::server_state(
                config.chain(pipeline),
                config.directory_loader(),
                max_upload_bytes,
            );
            commands::serve(addr, state).await?;
        }
    }
    Ok(())
}
