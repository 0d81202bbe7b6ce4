use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pdfchat_rag::{ErrorKind, RagError};
use thiserror::Error;

use crate::handlers::ErrorBody;

/// Errors returned by handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Rag(#[from] RagError),

    /// The request body could not be read.
    #[error("invalid upload: {0}")]
    Upload(String),

    #[error("failed to store upload: {0}")]
    Storage(#[from] std::io::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Rag(e) => status_for(e.kind()),
            Self::Upload(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Name reported as `error.kind`.
    pub fn kind_name(&self) -> String {
        match self {
            Self::Rag(e) => e.kind().to_string(),
            Self::Upload(_) => ErrorKind::Validation.to_string(),
            Self::Storage(_) => "StorageError".to_string(),
        }
    }
}

pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Load => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Embed
        | ErrorKind::VectorStore
        | ErrorKind::Generation
        | ErrorKind::Unavailable => StatusCode::BAD_GATEWAY,
        ErrorKind::Config => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "request failed");
        } else {
            tracing::warn!(%status, error = %self, "request rejected");
        }
        (status, Json(ErrorBody::new(self.kind_name(), self.to_string()))).into_response()
    }
}
