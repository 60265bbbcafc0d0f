//! Error types for the edgequake-docregen library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DocRegenError`] — **Fatal**: the request cannot produce a document
//!   (missing project name, input is not HTML, assembled document is broken,
//!   a requested export format failed). Returned as `Err(DocRegenError)`.
//!
//! * [`SectionGenerationFailure`] — **Non-fatal**: one section could not be
//!   regenerated and fell back to its original HTML. Stored inside
//!   [`crate::model::GeneratedSection`] so callers can report partial
//!   regeneration without losing the document.
//!
//! A document is always produced once parsing succeeded, even when every
//! section fell back to its original content.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Export target of the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Docx,
}

impl ExportFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "docx",
        }
    }

    /// MIME type of the rendered bytes.
    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = DocRegenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(ExportFormat::Pdf),
            "docx" => Ok(ExportFormat::Docx),
            other => Err(DocRegenError::InvalidConfig(format!(
                "unknown export format '{other}' (expected pdf or docx)"
            ))),
        }
    }
}

/// All fatal errors returned by the edgequake-docregen library.
///
/// Section-level failures use [`SectionGenerationFailure`] and are stored in
/// [`crate::model::GeneratedSection`] rather than propagated here.
#[derive(Debug, Error)]
pub enum DocRegenError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A required context field is missing or malformed. Never retried.
    #[error("Invalid input for '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// The input bytes are not an HTML document.
    #[error("Input is not HTML: {reason}")]
    NotHtml { reason: String },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The reassembled document is not well-formed.
    #[error("Assembled document is not well-formed: {reason}")]
    Assembly { reason: String },

    // ── Export errors ─────────────────────────────────────────────────────
    /// Rendering one export format failed. The other format is unaffected.
    #[error("{format} export failed: {detail}")]
    ExportRender { format: ExportFormat, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocRegenError {
    pub(crate) fn validation(field: &str, reason: impl Into<String>) -> Self {
        DocRegenError::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn render(format: ExportFormat, detail: impl Into<String>) -> Self {
        DocRegenError::ExportRender {
            format,
            detail: detail.into(),
        }
    }

    /// The export format this error belongs to, if it is a render failure.
    pub fn export_format(&self) -> Option<ExportFormat> {
        match self {
            DocRegenError::ExportRender { format, .. } => Some(*format),
            _ => None,
        }
    }
}

/// A non-fatal failure for a single section.
///
/// Stored on [`crate::model::GeneratedSection`] when the section fell back to
/// its original HTML. The pipeline always continues.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum SectionGenerationFailure {
    /// The content writer raised on every attempt.
    #[error("Section {section_id}: writer failed after {attempts} attempt(s): {detail}")]
    WriterFailed {
        section_id: String,
        attempts: u32,
        detail: String,
    },

    /// The writer answered, but the last answer failed validation.
    #[error("Section {section_id}: output rejected after {attempts} attempt(s): {detail}")]
    InvalidOutput {
        section_id: String,
        attempts: u32,
        detail: String,
    },

    /// The last attempt exceeded the per-call timeout.
    #[error("Section {section_id}: writer call timed out after {timeout_ms}ms")]
    AttemptTimeout { section_id: String, timeout_ms: u64 },

    /// The generation phase deadline passed before the section finished.
    #[error("Section {section_id}: generation phase timed out after {timeout_ms}ms")]
    PhaseTimeout { section_id: String, timeout_ms: u64 },
}

impl SectionGenerationFailure {
    pub fn section_id(&self) -> &str {
        match self {
            SectionGenerationFailure::WriterFailed { section_id, .. }
            | SectionGenerationFailure::InvalidOutput { section_id, .. }
            | SectionGenerationFailure::AttemptTimeout { section_id, .. }
            | SectionGenerationFailure::PhaseTimeout { section_id, .. } => section_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_names_field() {
        let e = DocRegenError::validation("project_name", "must not be empty");
        let msg = e.to_string();
        assert!(msg.contains("project_name"), "got: {msg}");
        assert!(msg.contains("must not be empty"));
    }

    #[test]
    fn export_render_names_format() {
        let e = DocRegenError::render(ExportFormat::Pdf, "font missing");
        assert_eq!(e.export_format(), Some(ExportFormat::Pdf));
        assert!(e.to_string().starts_with("pdf export failed"));
    }

    #[test]
    fn export_format_parses_case_insensitively() {
        assert_eq!("PDF".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert_eq!(" docx ".parse::<ExportFormat>().unwrap(), ExportFormat::Docx);
        assert!("odt".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn section_failure_exposes_id() {
        let f = SectionGenerationFailure::PhaseTimeout {
            section_id: "sec-0003".into(),
            timeout_ms: 30_000,
        };
        assert_eq!(f.section_id(), "sec-0003");
        assert!(f.to_string().contains("30000ms"));
    }
}
