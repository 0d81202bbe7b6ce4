use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use pdfchat_server::DEFAULT_MAX_UPLOAD_BYTES;
use pdfchat_telemetry::{LogFormat, TelemetryConfig};

/// Chat with a directory of PDFs.
#[derive(Parser, Debug)]
#[command(name = "pdfchat", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Load, split, embed and store every PDF in the documents directory
    Ingest,
    /// Answer a question from the ingested documents
    Ask {
        question: String,
        /// Print the whole answer as JSON instead of streaming tokens
        #[arg(long)]
        no_stream: bool,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: SocketAddr,
        #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
        max_upload_bytes: usize,
    },
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub openai_api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", global = true)]
    pub openai_base_url: Option<String>,

    #[arg(long, env = "PDFCHAT_CHAT_MODEL", global = true)]
    pub chat_model: Option<String>,

    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true, global = true)]
    pub pinecone_api_key: Option<String>,

    /// Region of the Pinecone index, e.g. us-east-1
    #[arg(long, env = "PINECONE_ENVIRONMENT", global = true)]
    pub pinecone_environment: Option<String>,

    #[arg(long, env = "PDFCHAT_COLLECTION", default_value = "collectiondb", global = true)]
    pub collection: String,

    #[arg(long, env = "PDFCHAT_DOCUMENTS_DIR", default_value = "./pdf-documents", global = true)]
    pub documents_dir: PathBuf,

    /// Glob pattern relative to the documents directory
    #[arg(long, default_value = "**/*.pdf", global = true)]
    pub glob: String,

    /// Maximum number of PDFs parsed at once
    #[arg(long, default_value_t = 50, global = true)]
    pub concurrency: usize,

    /// Stop at the first file that fails to load instead of skipping it
    #[arg(long, global = true)]
    pub fail_fast: bool,

    #[arg(long, default_value_t = 500, global = true)]
    pub chunk_size: usize,

    #[arg(long, default_value_t = 50, global = true)]
    pub chunk_overlap: usize,

    /// Number of chunks retrieved per question
    #[arg(long, default_value_t = 4, global = true)]
    pub top_k: usize,

    /// Seconds allowed for each external call
    #[arg(long, default_value_t = 60, global = true)]
    pub timeout_secs: u64,

    #[arg(long, env = "PDFCHAT_LOG_FORMAT", default_value = "compact", global = true)]
    pub log_format: LogFormat,

    /// Level used when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,
}

impl Settings {
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig { format: self.log_format, default_level: self.log_level.clone() }
    }
}
