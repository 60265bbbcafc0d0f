//! Validation of regenerated section HTML.
//!
//! An attempt is accepted only if its cleaned output is a non-empty,
//! well-formed HTML fragment that keeps every kind of structural marker the
//! original section had: a section with a table must come back with a table,
//! and likewise for lists and headings.

use crate::html::{self, StructureCounts};
use crate::model::DocumentSection;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Why an attempt's output was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OutputIssue {
    #[error("output is empty")]
    Empty,
    #[error("output contains no HTML elements")]
    NotHtml,
    #[error("output is not well-formed: {0}")]
    Malformed(String),
    #[error("output is missing a {0} present in the original section")]
    MissingStructure(&'static str),
}

static RE_ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[A-Za-z][A-Za-z0-9]*[\s/>]").unwrap());

/// Check `output` against the section it replaces.
pub fn validate_output(original: &DocumentSection, output: &str) -> Result<(), OutputIssue> {
    if output.trim().is_empty() {
        return Err(OutputIssue::Empty);
    }
    if !RE_ANY_TAG.is_match(output) {
        return Err(OutputIssue::NotHtml);
    }
    html::check_well_formed(output).map_err(OutputIssue::Malformed)?;

    let expected = StructureCounts::of(&original.html_content);
    let actual = StructureCounts::of(output);
    if expected.tables > 0 && actual.tables == 0 {
        return Err(OutputIssue::MissingStructure("table"));
    }
    if expected.lists > 0 && actual.lists == 0 {
        return Err(OutputIssue::MissingStructure("list"));
    }
    if expected.headings > 0 && actual.headings == 0 {
        return Err(OutputIssue::MissingStructure("heading"));
    }
    Ok(())
}
