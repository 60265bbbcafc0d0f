//! The content-generation collaborator.
//!
//! The generator only knows a [`SectionWriter`]: given one section and the
//! context, return replacement HTML or fail. The caller creates the writer
//! and passes it to the pipeline. [`crate::pipeline::llm::LlmSectionWriter`]
//! is the production implementation; tests use in-memory fakes.

use crate::context::GenerationContext;
use crate::model::DocumentSection;
use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single writer call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WriterError {
    /// Worth retrying: timeouts, rate limits, 5xx.
    #[error("{0}")]
    Transient(String),
    /// Retrying cannot help: bad credentials, rejected request.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl WriterError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, WriterError::Permanent(_))
    }
}

/// Regenerates one section of a document.
///
/// Implementations must be stateless with respect to sections: the pipeline
/// calls `write_section` concurrently and every retry is a fresh call.
#[async_trait]
pub trait SectionWriter: Send + Sync {
    async fn write_section(
        &self,
        section: &DocumentSection,
        context: &GenerationContext,
    ) -> Result<String, WriterError>;
}

/// Returns every section unchanged. Useful for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityWriter;

#[async_trait]
impl SectionWriter for IdentityWriter {
    async fn write_section(
        &self,
        section: &DocumentSection,
        _context: &GenerationContext,
    ) -> Result<String, WriterError> {
        Ok(section.html_content.clone())
    }
}
