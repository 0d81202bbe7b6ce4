use std::path::Path;
use std::sync::Arc;

use pdfchat_rag::{DirectoryLoader, QaChain, RagPipeline};

/// Upload size limit unless configured otherwise.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Shared state of all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub chain: Arc<QaChain>,
    pub loader: DirectoryLoader,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(chain: Arc<QaChain>, loader: DirectoryLoader) -> Self {
        Self { chain, loader, max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES }
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn pipeline(&self) -> &Arc<RagPipeline> {
        self.chain.pipeline()
    }

    /// Where uploads are written and ingestion reads from.
    pub fn documents_dir(&self) -> &Path {
        &self.loader.config().root
    }
}
