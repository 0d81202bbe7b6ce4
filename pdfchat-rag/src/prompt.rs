//! The two-slot prompt template used by the query chain.

use crate::document::SearchResult;
use crate::error::{RagError, Result};

/// The template used unless another is configured.
pub const DEFAULT_TEMPLATE: &str = "
Answer given the following context:
{context}

Question: {question}
";

const CONTEXT_SLOT: &str = "{context}";
const QUESTION_SLOT: &str = "{question}";

/// A prompt template with exactly one `{context}` and one `{question}` slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { template: DEFAULT_TEMPLATE.to_string() }
    }
}

impl PromptTemplate {
    /// Create a template, checking that both slots appear exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a slot is missing or repeated.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for slot in [CONTEXT_SLOT, QUESTION_SLOT] {
            let count = template.matches(slot).count();
            if count != 1 {
                return Err(RagError::ConfigError(format!(
                    "prompt template must contain {slot} exactly once, found {count}"
                )));
            }
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fill both slots.
    ///
    /// The question is substituted last so braces in retrieved text are never
    /// mistaken for the question slot.
    pub fn render(&self, context: &str, question: &str) -> String {
        let (before, after) = self
            .template
            .split_once(QUESTION_SLOT)
            .unwrap_or((self.template.as_str(), ""));
        format!(
            "{}{question}{}",
            before.replace(CONTEXT_SLOT, context),
            after.replace(CONTEXT_SLOT, context)
        )
    }

    /// Render with retrieved chunks as context, in the order given.
    pub fn render_with_docs(&self, docs: &[SearchResult], question: &str) -> String {
        self.render(&join_context(docs), question)
    }
}

/// Concatenate chunk texts, separated by blank lines.
pub fn join_context(docs: &[SearchResult]) -> String {
    docs.iter().map(|d| d.entry.text.as_str()).collect::<Vec<_>>().join("\n\n")
}
