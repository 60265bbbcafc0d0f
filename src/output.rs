//! Result types returned by the generation pipeline.

use crate::error::DocRegenError;
use crate::model::{GeneratedSection, SectionStatus};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Document-level outcome of a generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationStatus {
    /// Every section was regenerated.
    Completed,
    /// Some sections fell back to their original HTML.
    PartiallyCompleted,
    /// Every section fell back. The document is still complete.
    AllFallback,
    /// The input had no sections.
    Empty,
}

/// Timing and attempt counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub total_sections: usize,
    pub succeeded_sections: usize,
    pub fallback_sections: usize,
    /// Writer calls across all sections.
    pub total_attempts: u64,
    /// Sections that needed more than one attempt.
    pub retried_sections: usize,
    /// Parse + generation + assembly.
    pub total_duration_ms: u64,
    pub generation_duration_ms: u64,
}

/// Everything a caller needs after a generation run.
///
/// `success` is `true` whenever a document was assembled, including when every
/// section fell back; see [`GenerationResult::status`] for the finer outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// One entry per section, in `order_index` order.
    pub sections: Vec<GeneratedSection>,
    pub sections_processed: usize,
    pub sections_failed: usize,
    pub final_html: String,
    /// Section failure messages in document order.
    pub errors: Vec<String>,
    pub success: bool,
    pub status: GenerationStatus,
    pub stats: GenerationStats,
}

impl GenerationResult {
    /// Sections that fell back to their original HTML.
    pub fn fallback_sections(&self) -> impl Iterator<Item = &GeneratedSection> {
        self.sections.iter().filter(|s| s.is_fallback())
    }

    pub fn section(&self, section_id: &str) -> Option<&GeneratedSection> {
        self.sections.iter().find(|s| s.section_id == section_id)
    }
}

impl GenerationStatus {
    pub fn from_counts(total: usize, failed: usize) -> Self {
        match (total, failed) {
            (0, _) => GenerationStatus::Empty,
            (_, 0) => GenerationStatus::Completed,
            (t, f) if f >= t => GenerationStatus::AllFallback,
            _ => GenerationStatus::PartiallyCompleted,
        }
    }
}

pub(crate) fn count_status(sections: &[GeneratedSection], status: SectionStatus) -> usize {
    sections.iter().filter(|s| s.status == status).count()
}

/// Write `bytes` to `path` through a temp file + rename, so readers never
/// see a partial file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DocRegenError> {
    let fail = |source: std::io::Error| DocRegenError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);
    tokio::fs::write(&tmp_path, bytes).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_counts() {
        assert_eq!(GenerationStatus::from_counts(0, 0), GenerationStatus::Empty);
        assert_eq!(GenerationStatus::from_counts(5, 0), GenerationStatus::Completed);
        assert_eq!(GenerationStatus::from_counts(5, 2), GenerationStatus::PartiallyCompleted);
        assert_eq!(GenerationStatus::from_counts(5, 5), GenerationStatus::AllFallback);
    }

    #[tokio::test]
    async fn write_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.html");
        write_atomic(&path, b"<p>x</p>").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<p>x</p>");
        assert!(!dir.path().join("nested/out.html.tmp").exists());
    }

    #[test]
    fn status_serialises_kebab_case() {
        let json = serde_json::to_string(&GenerationStatus::AllFallback).unwrap();
        assert_eq!(json, "\"all-fallback\"");
    }
}
