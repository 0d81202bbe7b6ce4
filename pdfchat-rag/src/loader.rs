//! Document loading from a directory tree.
//!
//! [`DirectoryLoader`] discovers files by glob pattern and parses them with a
//! [`DocumentLoader`] on the blocking pool, a bounded number at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::document::Document;
use crate::error::{RagError, Result};

/// Parses a single file into a [`Document`].
///
/// Loaders are synchronous; [`DirectoryLoader`] runs them on the blocking pool.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Document>;
}

/// What to do when a file fails to load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Log the failure, record it in the report, and continue.
    #[default]
    SkipAndLog,
    /// Stop ingestion at the first failure.
    Abort,
}

/// Where to find documents and how to load them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Directory scanned for documents.
    pub root: PathBuf,
    /// Glob pattern relative to `root`.
    pub pattern: String,
    /// Maximum number of files parsed at once.
    pub concurrency: usize,
    pub policy: LoadPolicy,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./pdf-documents"),
            pattern: "**/*.pdf".to_string(),
            concurrency: 50,
            policy: LoadPolicy::SkipAndLog,
        }
    }
}

fn load_error(path: &Path, message: impl Into<String>) -> RagError {
    RagError::LoadError { path: path.to_path_buf(), message: message.into() }
}

/// Build a document for `path` with the standard source metadata.
fn document_for(path: &Path, text: String) -> Document {
    let mut document = Document::new(Document::id_for_path(path), text);
    document.metadata.insert("source".to_string(), path.display().to_string());
    if let Some(name) = path.file_name() {
        document.metadata.insert("file_name".to_string(), name.to_string_lossy().into_owned());
    }
    document
}

/// Loads UTF-8 text files (plain text, markdown).
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> Result<Document> {
        let text = std::fs::read_to_string(path).map_err(|e| load_error(path, e.to_string()))?;
        Ok(document_for(path, text))
    }
}

/// Extracts the text layer of PDF files.
///
/// Page breaks (form feeds in the extracted text) become paragraph breaks so
/// the splitter can prefer them. The page count is recorded as `page_count`.
#[cfg(feature = "pdf")]
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

#[cfg(feature = "pdf")]
impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Result<Document> {
        let raw = pdf_extract::extract_text(path)
            .map_err(|e| load_error(path, format!("failed to extract PDF text: {e}")))?;
        let page_count = raw.split('\x0c').filter(|page| !page.trim().is_empty()).count();
        let mut document = document_for(path, raw.replace('\x0c', "\n\n"));
        document.metadata.insert("page_count".to_string(), page_count.to_string());
        Ok(document)
    }
}

/// Discovers and loads every file under a directory that matches a glob.
///
/// # Example
///
/// ```rust,ignore
/// use pdfchat_rag::{DirectoryLoader, LoaderConfig};
///
/// let loader = DirectoryLoader::pdf(LoaderConfig::default());
/// let mut documents = loader.load_all()?;
/// while let Some(document) = documents.next().await { /* ... */ }
/// ```
#[derive(Clone)]
pub struct DirectoryLoader {
    config: LoaderConfig,
    loader: Arc<dyn DocumentLoader>,
}

impl DirectoryLoader {
    pub fn new(config: LoaderConfig, loader: Arc<dyn DocumentLoader>) -> Self {
        Self { config, loader }
    }

    /// A directory loader that parses PDFs.
    #[cfg(feature = "pdf")]
    pub fn pdf(config: LoaderConfig) -> Self {
        Self::new(config, Arc::new(PdfLoader))
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// List matching files, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the root is not a directory or the
    /// pattern is invalid.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let root = &self.config.root;
        if !root.is_dir() {
            return Err(RagError::ConfigError(format!(
                "documents directory '{}' does not exist or is not a directory",
                root.display()
            )));
        }

        let pattern = root.join(&self.config.pattern);
        let paths = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| RagError::ConfigError(format!("invalid glob '{}': {e}", self.config.pattern)))?;

        let mut files: Vec<PathBuf> = paths
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable path during discovery");
                    None
                }
            })
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        debug!(
            root = %root.display(),
            pattern = %self.config.pattern,
            count = files.len(),
            "discovered documents"
        );
        Ok(files)
    }

    /// Lazily load every discovered file.
    ///
    /// At most `concurrency` files are parsed at once; documents come out in
    /// discovery order. Each item is either a document with non-empty text or
    /// a [`RagError::LoadError`] for that file.
    pub fn load_all(&self) -> Result<BoxStream<'static, Result<Document>>> {
        let files = self.discover()?;
        Ok(self.load_paths(files))
    }

    /// Lazily load the given files.
    pub fn load_paths(&self, files: Vec<PathBuf>) -> BoxStream<'static, Result<Document>> {
        let loader = self.loader.clone();
        futures::stream::iter(files)
            .map(move |path| load_one(loader.clone(), path))
            .buffered(self.config.concurrency.max(1))
            .boxed()
    }
}

impl std::fmt::Debug for DirectoryLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryLoader").field("config", &self.config).finish()
    }
}

async fn load_one(loader: Arc<dyn DocumentLoader>, path: PathBuf) -> Result<Document> {
    let task_path = path.clone();
    let document = tokio::task::spawn_blocking(move || loader.load(&task_path))
        .await
        .map_err(|e| load_error(&path, format!("loader task failed: {e}")))??;

    if document.text.trim().is_empty() {
        return Err(load_error(&path, "document contains no extractable text"));
    }
    debug!(path = %path.display(), chars = document.text.len(), "loaded document");
    Ok(document)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn text_loader(root: &Path) -> DirectoryLoader {
        let config = LoaderConfig {
            root: root.to_path_buf(),
            pattern: "**/*.txt".to_string(),
            concurrency: 4,
            policy: LoadPolicy::SkipAndLog,
        };
        DirectoryLoader::new(config, Arc::new(TextLoader))
    }

    #[test]
    fn discovers_nested_matches_only() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("nested/deeper")).unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        fs::write(temp.path().join("nested/deeper/b.txt"), "b").unwrap();
        fs::write(temp.path().join("notes.md"), "ignored").unwrap();

        let files = text_loader(temp.path()).discover().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| p.extension().is_some_and(|ext| ext == "txt")));
    }

    #[test]
    fn missing_root_is_a_config_error() {
        let err = text_loader(Path::new("/definitely/not/here")).discover().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[tokio::test]
    async fn empty_and_invalid_files_fail_individually() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("1-good.txt"), "Paris is the capital of France.").unwrap();
        fs::write(temp.path().join("2-empty.txt"), "   \n").unwrap();
        fs::write(temp.path().join("3-binary.txt"), [0xff, 0xfe, 0x00, 0x80]).unwrap();

        let outcomes: Vec<Result<Document>> =
            text_loader(temp.path()).load_all().unwrap().collect().await;
        assert_eq!(outcomes.len(), 3);
        let document = outcomes[0].as_ref().unwrap();
        assert_eq!(document.metadata["file_name"], "1-good.txt");
        assert!(document.metadata["source"].ends_with("1-good.txt"));
        assert!(matches!(outcomes[1], Err(RagError::LoadError { .. })));
        assert!(matches!(outcomes[2], Err(RagError::LoadError { .. })));
    }

    #[cfg(feature = "pdf")]
    #[tokio::test]
    async fn corrupt_pdf_is_a_load_error() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("broken.pdf"), b"this is not a pdf").unwrap();

        let loader = DirectoryLoader::pdf(LoaderConfig {
            root: temp.path().to_path_buf(),
            ..LoaderConfig::default()
        });
        let outcomes: Vec<Result<Document>> = loader.load_all().unwrap().collect().await;
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], Err(RagError::LoadError { .. })));
    }
}
