//! # pdfchat-server
//!
//! The HTTP surface of pdfchat, built on `axum`.
//!
//! | route | purpose |
//! |-------|---------|
//! | `POST /rag/invoke` | answer a question |
//! | `POST /rag/stream` | answer a question as server-sent events |
//! | `POST /upload` | store uploaded PDFs in the documents directory |
//! | `POST /load-and-process-pdfs` | ingest the documents directory |
//! | `GET /health` | liveness |

mod error;
mod handlers;
mod routes;
mod state;

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

pub use error::ApiError;
pub use handlers::{
    ErrorBody, ErrorDetail, InvokeMetadata, InvokeRequest, InvokeResponse, UploadResponse,
};
pub use routes::router;
pub use state::{AppState, DEFAULT_MAX_UPLOAD_BYTES};

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "pdfchat server listening");
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await
}
