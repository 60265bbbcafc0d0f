//! Section-level data model shared by every pipeline stage.
//!
//! A [`DocumentSection`] is produced once by the parser and never mutated
//! afterwards; the generator wraps it into a [`GeneratedSection`] that keeps
//! both the original and the regenerated HTML so a fallback is always
//! available.

use crate::error::SectionGenerationFailure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Structural kind of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionType {
    /// A heading and the content it owns up to the next heading.
    Heading,
    /// Content consisting only of tables.
    Table,
    /// Content consisting only of lists.
    List,
    /// Paragraphs and inline text.
    ParagraphGroup,
    /// Anything else, e.g. a paragraph followed by a table.
    Mixed,
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SectionType::Heading => "heading",
            SectionType::Table => "table",
            SectionType::List => "list",
            SectionType::ParagraphGroup => "paragraph-group",
            SectionType::Mixed => "mixed",
        };
        f.write_str(s)
    }
}

/// Descriptive metadata computed at parse time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionMetadata {
    /// Heading level 1–6 for heading sections, 0 otherwise.
    pub level: u8,
    /// Tag name of the section's first element (`h2`, `table`, `p`, …).
    pub tag_name: String,
    /// `class` tokens of the first element.
    pub classes: Vec<String>,
    /// Other attributes of the first element.
    pub attributes: BTreeMap<String, String>,
    /// Number of `\w+` tokens in the section text.
    pub word_count: usize,
    /// Rough structural complexity; higher means denser markup.
    pub complexity_score: f64,
}

/// One contiguous, semantically coherent fragment of the input document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSection {
    /// Unique within the document, assigned in document order.
    pub id: String,
    /// Original HTML fragment, normalised and well-formed.
    pub html_content: String,
    pub section_type: SectionType,
    /// Position in the document. The only meaningful order.
    pub order_index: usize,
    /// Closest preceding heading section with a lower level.
    pub parent_id: Option<String>,
    /// Directly owned sections, in document order.
    pub children: Vec<String>,
    pub metadata: SectionMetadata,
}

impl DocumentSection {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Lifecycle of a section inside the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionStatus {
    /// Created, no attempt finished yet.
    Pending,
    /// Regenerated content passed validation.
    Success,
    /// Retries exhausted; the original HTML is used.
    FailedFallback,
    /// Retries exhausted and the original HTML itself is not well-formed.
    FailedUnrecoverable,
}

impl SectionStatus {
    /// `true` once the section can no longer change.
    pub fn is_terminal(self) -> bool {
        !matches!(self, SectionStatus::Pending)
    }
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SectionStatus::Pending => "pending",
            SectionStatus::Success => "success",
            SectionStatus::FailedFallback => "failed-fallback",
            SectionStatus::FailedUnrecoverable => "failed-unrecoverable",
        };
        f.write_str(s)
    }
}

/// A section after the generation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSection {
    /// References [`DocumentSection::id`].
    pub section_id: String,
    /// Copied from the source section so assembly needs nothing else.
    pub order_index: usize,
    pub parent_id: Option<String>,
    pub original_html: String,
    /// Regenerated HTML, or `original_html` after a fallback.
    pub generated_html: String,
    pub status: SectionStatus,
    /// Writer calls made for this section.
    pub attempt_count: u32,
    /// Why the section fell back, if it did.
    pub failure: Option<SectionGenerationFailure>,
    /// Wall-clock time spent on this section.
    pub duration_ms: u64,
}

impl GeneratedSection {
    /// A fresh record for `section`, before any attempt.
    pub fn pending(section: &DocumentSection) -> Self {
        Self {
            section_id: section.id.clone(),
            order_index: section.order_index,
            parent_id: section.parent_id.clone(),
            original_html: section.html_content.clone(),
            generated_html: String::new(),
            status: SectionStatus::Pending,
            attempt_count: 0,
            failure: None,
            duration_ms: 0,
        }
    }

    /// Identity record: the section "regenerated" to its own content.
    pub fn unchanged(section: &DocumentSection) -> Self {
        let mut s = Self::pending(section);
        s.generated_html = section.html_content.clone();
        s.status = SectionStatus::Success;
        s
    }

    pub fn is_fallback(&self) -> bool {
        matches!(
            self.status,
            SectionStatus::FailedFallback | SectionStatus::FailedUnrecoverable
        )
    }
}
