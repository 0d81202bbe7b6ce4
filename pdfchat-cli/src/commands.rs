use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use pdfchat_rag::{DirectoryLoader, IngestReport, QaChain, RagInput, RagPipeline, SearchResult};
use pdfchat_server::AppState;
use tracing::{info, warn};

/// Create the collection if needed, then ingest every document the loader finds.
pub async fn ingest(
    pipeline: &RagPipeline,
    loader: &DirectoryLoader,
    out: &mut impl Write,
) -> anyhow::Result<IngestReport> {
    pipeline.ensure_collection().await.context("failed to prepare the vector collection")?;
    let report = pipeline
        .ingest_directory(loader)
        .await
        .with_context(|| format!("failed to ingest {}", loader.config().root.display()))?;

    let elapsed = (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0;
    writeln!(
        out,
        "Ingested {} documents ({} chunks) into '{}' in {elapsed:.1}s",
        report.documents,
        report.chunks,
        pipeline.collection().name()
    )?;
    if !report.is_clean() {
        writeln!(out, "Skipped {} files:", report.failures.len())?;
        for failure in &report.failures {
            writeln!(out, "  {}: {}", failure.path.display(), failure.message)?;
        }
    }
    Ok(report)
}

fn source_of(result: &SearchResult) -> &str {
    result.entry.metadata.get("source").map(String::as_str).unwrap_or(&result.entry.document_id)
}

/// Answer `question`, streaming tokens to `out` as they arrive.
///
/// With `no_stream`, the complete answer is printed as JSON instead.
pub async fn ask(
    chain: &QaChain,
    question: &str,
    no_stream: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let input = RagInput::new(question);

    if no_stream {
        let answer = chain.invoke(input).await?;
        writeln!(out, "{}", serde_json::to_string_pretty(&answer)?)?;
        return Ok(());
    }

    let mut stream = chain.stream(input).await?;
    while let Some(token) = stream.next_token().await {
        write!(out, "{}", token?)?;
        out.flush()?;
    }
    writeln!(out)?;

    if !stream.docs().is_empty() {
        writeln!(out, "\nSources:")?;
        for doc in stream.docs() {
            writeln!(out, "  - {} (score {:.3})", source_of(doc), doc.score)?;
        }
    }
    Ok(())
}

/// Serve the HTTP API until ctrl-c.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    pdfchat_server::serve(addr, state, shutdown_signal())
        .await
        .with_context(|| format!("server on {addr} failed"))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
    }
}

/// Build the server state around a shared chain.
pub fn server_state(chain: QaChain, loader: DirectoryLoader, max_upload_bytes: usize) -> AppState {
    AppState::new(Arc::new(chain), loader).with_max_upload_bytes(max_upload_bytes)
}
