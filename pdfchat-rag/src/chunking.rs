//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! cuts text into overlapping windows and prefers natural break points
//! (paragraphs, lines, sentences, words) over hard character cuts.

use crate::config::RagConfig;
use crate::document::{Chunk, Document};

/// Break points in order of preference. The separator stays attached to the
/// chunk it ends.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no non-whitespace text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text into windows of at most `chunk_size` characters where every
/// pair of neighbouring chunks shares exactly `chunk_overlap` characters.
///
/// Lengths are counted in `char`s, so multi-byte text is never cut inside a
/// code point. Chunk IDs are generated as `{document_id}_{chunk_index}`. Each
/// chunk inherits the parent document's metadata plus a `chunk_index` field.
///
/// # Example
///
/// ```rust,ignore
/// use pdfchat_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(500, 50);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// `chunk_overlap` is clamped below `chunk_size`; use
    /// [`RagConfig::builder`] to reject such settings instead.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
    }

    /// Create a chunker from a validated [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split raw text into chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let mut pieces = Vec::new();
        let mut start = 0;

        loop {
            if chars.len() - start <= self.chunk_size {
                pieces.push(chars[start..].iter().collect());
                break;
            }
            let end = self.find_break(&chars, start);
            pieces.push(chars[start..end].iter().collect());
            // find_break guarantees end - overlap > start
            start = end - self.chunk_overlap;
        }

        pieces
    }

    /// Pick the end of the chunk starting at `start`.
    ///
    /// Only break points in the second half of the window (and past the
    /// overlap) are considered, so chunks stay reasonably full and the next
    /// window always moves forward.
    fn find_break(&self, chars: &[char], start: usize) -> usize {
        let window_end = start + self.chunk_size;
        let min_end = start + (self.chunk_overlap + 1).max(self.chunk_size / 2);

        for separator in SEPARATORS {
            let sep: Vec<char> = separator.chars().collect();
            let mut end = window_end;
            while end >= min_end && end >= start + sep.len() {
                if chars[end - sep.len()..end] == sep[..] {
                    return end;
                }
                end -= 1;
            }
        }

        window_end
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let mut metadata = document.metadata.clone();
                metadata.insert("chunk_index".to_string(), index.to_string());
                Chunk {
                    id: format!("{}_{index}", document.id),
                    document_id: document.id.clone(),
                    index,
                    text,
                    metadata,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = RecursiveChunker::new(500, 50);
        assert_eq!(chunker.split_text("Paris is the capital of France."), vec![
            "Paris is the capital of France.".to_string()
        ]);
    }

    #[test]
    fn whitespace_only_text_has_no_chunks() {
        let chunker = RecursiveChunker::new(10, 2);
        assert!(chunker.split_text("").is_empty());
        assert!(chunker.split_text(" \n\t ").is_empty());
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let chunker = RecursiveChunker::new(30, 5);
        let text = "First paragraph here.\n\nSecond paragraph follows on.";
        let chunks = chunker.split_text(text);
        assert_eq!(chunks[0], "First paragraph here.\n\n");
        assert!(chunks[1].starts_with("re.\n\n"));
    }

    #[test]
    fn falls_back_to_hard_cuts() {
        let chunker = RecursiveChunker::new(4, 1);
        let chunks = chunker.split_text("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn never_splits_inside_a_code_point() {
        let chunker = RecursiveChunker::new(3, 1);
        let chunks = chunker.split_text("héllo wörld");
        assert!(chunks.iter().all(|c| c.chars().count() <= 3));
        assert_eq!(chunks.first().map(String::as_str), Some("hél"));
    }

    #[test]
    fn chunks_carry_document_metadata_and_index() {
        let mut document = Document::new("doc", "one two three four five six seven");
        document.metadata.insert("source".into(), "a.pdf".into());
        let chunks = RecursiveChunker::new(10, 2).chunk(&document);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, format!("doc_{i}"));
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.document_id, "doc");
            assert_eq!(chunk.metadata["source"], "a.pdf");
            assert_eq!(chunk.metadata["chunk_index"], i.to_string());
        }
    }

    #[test]
    fn overlap_is_clamped_below_chunk_size() {
        let chunker = RecursiveChunker::new(5, 9);
        let chunks = chunker.split_text("abcdefghijkl");
        assert!(chunks.len() > 1);
    }
}
