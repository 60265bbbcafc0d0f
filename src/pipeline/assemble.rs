//! Assembler: join generated sections back into one HTML document.
//!
//! Sections are emitted strictly in `order_index` order, whatever their
//! status, and only once every section is terminal. Hierarchy needs no
//! extra markup: the parser guarantees that a parent precedes its children,
//! so document order already nests each heading's content under it. The
//! assembler re-checks that guarantee and the well-formedness of the result.

use crate::error::DocRegenError;
use crate::html;
use crate::model::GeneratedSection;
use crate::pipeline::parse::parse_sections;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Separator placed between sections.
pub const SECTION_SEPARATOR: &str = "\n";

/// Assemble `sections` into the final HTML document.
///
/// # Errors
/// [`DocRegenError::Assembly`] when a section is not terminal, two sections
/// share an id or an `order_index`, a parent does not precede its child, or
/// the concatenated document is not well-formed.
pub fn assemble(sections: &[GeneratedSection]) -> Result<String, DocRegenError> {
    let mut ordered: Vec<&GeneratedSection> = sections.iter().collect();
    ordered.sort_by_key(|s| s.order_index);

    let mut seen_ids: HashSet<&str> = HashSet::with_capacity(ordered.len());
    let mut position: HashMap<&str, usize> = HashMap::with_capacity(ordered.len());
    for pair in ordered.windows(2) {
        if pair[0].order_index == pair[1].order_index {
            return Err(assembly(format!(
                "sections {} and {} share order index {}",
                pair[0].section_id, pair[1].section_id, pair[0].order_index
            )));
        }
    }

    for s in &ordered {
        if !s.status.is_terminal() {
            return Err(assembly(format!("section {} is still {}", s.section_id, s.status)));
        }
        if !seen_ids.insert(s.section_id.as_str()) {
            return Err(assembly(format!("duplicate section id {}", s.section_id)));
        }
        position.insert(s.section_id.as_str(), s.order_index);
    }

    for s in &ordered {
        if let Some(parent) = s.parent_id.as_deref() {
            match position.get(parent) {
                Some(&p) if p < s.order_index => {}
                Some(_) => {
                    return Err(assembly(format!(
                        "parent {parent} does not precede section {}",
                        s.section_id
                    )))
                }
                None => {
                    return Err(assembly(format!(
                        "section {} references unknown parent {parent}",
                        s.section_id
                    )))
                }
            }
        }
    }

    let final_html = ordered
        .iter()
        .map(|s| s.generated_html.as_str())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR);

    html::check_well_formed(&final_html).map_err(assembly)?;
    info!("Assembled {} sections into {} bytes", ordered.len(), final_html.len());
    Ok(final_html)
}

/// Parse `html` and assemble it again with every section unchanged.
pub fn reassemble(html: &str) -> Result<String, DocRegenError> {
    let generated: Vec<GeneratedSection> = parse_sections(html)
        .iter()
        .map(GeneratedSection::unchanged)
        .collect();
    assemble(&generated)
}

fn assembly(reason: impl Into<String>) -> DocRegenError {
    DocRegenError::Assembly {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::dom_fingerprint;
    use crate::model::SectionStatus;

    fn identity(html: &str) -> Vec<GeneratedSection> {
        parse_sections(html)
            .iter()
            .map(GeneratedSection::unchanged)
            .collect()
    }

    #[test]
    fn preserves_order_regardless_of_input_order() {
        let mut sections = identity("<h1>A</h1><p>a</p><h2>B</h2><p>b</p><h1>C</h1>");
        sections.reverse();
        let out = assemble(&sections).unwrap();
        let a = out.find("<h1>A</h1>").unwrap();
        let b = out.find("<h2>B</h2>").unwrap();
        let c = out.find("<h1>C</h1>").unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn identity_round_trip_is_dom_equivalent() {
        let html = "<p>lead</p><h1>A</h1><p>x</p><h2>B</h2><table><tr><th>h</th></tr><tr><td>1</td></tr></table>";
        let out = assemble(&identity(html)).unwrap();
        assert_eq!(dom_fingerprint(&out), dom_fingerprint(html));
    }

    #[test]
    fn reassembly_is_idempotent() {
        let html = "<h1>A</h1><p>x <b>y</b></p><ul><li>1</li></ul><h2>B</h2><pre>  code\n</pre>";
        let once = reassemble(html).unwrap();
        let twice = reassemble(&once).unwrap();
        assert_eq!(dom_fingerprint(&once), dom_fingerprint(&twice));
        assert_eq!(once, twice);
    }

    #[test]
    fn pending_sections_block_assembly() {
        let mut sections = identity("<h1>A</h1><h1>B</h1>");
        sections[1].status = SectionStatus::Pending;
        assert!(matches!(assemble(&sections), Err(DocRegenError::Assembly { .. })));
    }

    #[test]
    fn duplicate_order_index_is_rejected() {
        let mut sections = identity("<h1>A</h1><h1>B</h1>");
        sections[1].order_index = 0;
        assert!(assemble(&sections).is_err());
    }

    #[test]
    fn parent_must_precede_child() {
        let mut sections = identity("<h1>A</h1><h2>B</h2>");
        sections[0].parent_id = Some("sec-0002".into());
        let err = assemble(&sections).unwrap_err();
        assert!(err.to_string().contains("does not precede"), "{err}");
    }

    #[test]
    fn malformed_generated_html_is_an_assembly_error() {
        let mut sections = identity("<h1>A</h1><p>x</p>");
        sections[0].generated_html = "<div><p>x</p>".into();
        assert!(matches!(assemble(&sections), Err(DocRegenError::Assembly { .. })));
    }

    #[test]
    fn empty_input_assembles_to_empty_document() {
        assert_eq!(assemble(&[]).unwrap(), "");
    }
}
