use std::convert::Infallible;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use pdfchat_rag::chain::validate_question;
use pdfchat_rag::{Answer, IngestReport, RagError, RagInput};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Body of `/rag/invoke` and `/rag/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub input: RagInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeMetadata {
    pub run_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub output: Answer,
    pub metadata: InvokeMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Names of the files written to the documents directory.
    pub saved: Vec<String>,
    /// Names of the files that were not PDFs.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

/// JSON error envelope: `{"error": {"kind", "message"}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

impl ErrorBody {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { error: ErrorDetail { kind: kind.into(), message: message.into() } }
    }
}

fn invalid_body(rejection: JsonRejection) -> ApiError {
    ApiError::Rag(RagError::ValidationError(rejection.body_text()))
}

fn data_event(value: Value) -> Event {
    Event::default().event("data").data(value.to_string())
}

fn error_event(error: &ApiError) -> Event {
    let body = ErrorBody::new(error.kind_name(), error.to_string());
    Event::default().event("error").data(json!(body).to_string())
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn invoke(
    State(state): State<AppState>,
    payload: Result<Json<InvokeRequest>, JsonRejection>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let Json(request) = payload.map_err(invalid_body)?;
    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("rag.invoke", run_id = %run_id);

    let output = state.chain.invoke(request.input).instrument(span).await?;
    Ok(Json(InvokeResponse { output, metadata: InvokeMetadata { run_id } }))
}

/// Stream an answer as server-sent events.
///
/// Events: `metadata` with the run id, a `data` event with the retrieved
/// docs, one `data` event per token, then `end`. Failures after the stream
/// has started are sent as an `error` event followed by `end`. A client that
/// disconnects drops the stream, which releases the model connection.
pub async fn stream(
    State(state): State<AppState>,
    payload: Result<Json<InvokeRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = payload.map_err(invalid_body)?;
    validate_question(&request.input.question)?;

    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("rag.stream", run_id = %run_id);
    let chain = state.chain.clone();

    let events = async_stream::stream! {
        yield Ok(Event::default().event("metadata").data(json!({ "run_id": run_id }).to_string()));

        match chain.stream(request.input).instrument(span.clone()).await {
            Err(e) => {
                let error = ApiError::from(e);
                span.in_scope(|| warn!(error = %error, "stream failed before the first token"));
                yield Ok(error_event(&error));
            }
            Ok(mut answer) => {
                yield Ok(data_event(json!({ "docs": answer.docs() })));
                let mut tokens = 0usize;
                while let Some(token) = answer.next().await {
                    match token {
                        Ok(content) => {
                            tokens += 1;
                            yield Ok(data_event(json!({ "answer": { "content": content } })));
                        }
                        Err(e) => {
                            let error = ApiError::from(e);
                            span.in_scope(|| warn!(tokens, error = %error, "stream failed mid-answer"));
                            yield Ok(error_event(&error));
                            break;
                        }
                    }
                }
                span.in_scope(|| debug!(tokens, "stream finished"));
            }
        }

        yield Ok(Event::default().event("end").data("{}"));
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Reduce a client-supplied file name to a bare `*.pdf` basename.
pub(crate) fn pdf_basename(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name.starts_with('.') {
        return None;
    }
    let (stem, extension) = name.rsplit_once('.')?;
    if stem.is_empty() || !extension.eq_ignore_ascii_case("pdf") {
        return None;
    }
    Some(name.to_string())
}

/// Save the PDFs of the multipart field `files` into the documents directory.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let dir = state.documents_dir().to_path_buf();
    tokio::fs::create_dir_all(&dir).await?;

    let mut response = UploadResponse { saved: Vec::new(), skipped: Vec::new() };
    while let Some(field) =
        multipart.next_field().await.map_err(|e| ApiError::Upload(e.body_text()))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let raw_name = field.file_name().unwrap_or_default().to_string();
        let Some(name) = pdf_basename(&raw_name) else {
            debug!(file_name = %raw_name, "skipping non-pdf upload");
            response.skipped.push(raw_name);
            continue;
        };
        let bytes = field.bytes().await.map_err(|e| ApiError::Upload(e.body_text()))?;
        tokio::fs::write(dir.join(&name), &bytes).await?;
        debug!(file_name = %name, bytes = bytes.len(), "saved upload");
        response.saved.push(name);
    }

    if response.saved.is_empty() && response.skipped.is_empty() {
        return Err(ApiError::Upload("no files in multipart field 'files'".to_string()));
    }
    info!(
        saved = response.saved.len(),
        skipped = response.skipped.len(),
        dir = %dir.display(),
        "stored uploads"
    );
    Ok(Json(response))
}

/// Ingest every document in the documents directory.
pub async fn load_and_process(
    State(state): State<AppState>,
) -> Result<Json<IngestReport>, ApiError> {
    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("rag.ingest", run_id = %run_id);
    let pipeline = state.pipeline().clone();
    let report = async {
        pipeline.ensure_collection().await?;
        pipeline.ingest_directory(&state.loader).await
    }
    .instrument(span)
    .await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_are_reduced_to_pdf_basenames() {
        assert_eq!(pdf_basename("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(pdf_basename("../../etc/report.PDF").as_deref(), Some("report.PDF"));
        assert_eq!(pdf_basename("C:\\Users\\me\\notes.pdf").as_deref(), Some("notes.pdf"));
        assert_eq!(pdf_basename("notes.txt"), None);
        assert_eq!(pdf_basename(".pdf"), None);
        assert_eq!(pdf_basename("dir/"), None);
        assert_eq!(pdf_basename(""), None);
    }
}
