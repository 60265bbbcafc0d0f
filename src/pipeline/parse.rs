//! Section parser: split an HTML document into ordered, coherent sections.
//!
//! Boundaries are placed only at headings. Layout wrappers (`<div>`,
//! `<section>`, `<article>`, …) that contain headings are unwrapped first, so
//! a heading counts as top-level when only wrappers separate it from
//! `<body>`. A heading owns every following node up to the next heading, so
//! a run of paragraphs, a table or a list under a heading stays in one
//! section instead of becoming one section per tag. Content before the first
//! heading forms an implicit leading section. Tables and lists are never
//! split because boundaries are only ever placed *between* top-level nodes.
//!
//! Hierarchy is derived afterwards with a heading-level stack: a section's
//! parent is the closest preceding heading section with a strictly lower
//! level. Because children always follow their parent, a depth-first walk of
//! the tree visits sections in `order_index` order, which is what makes
//! [`render_tree`] reproduce the input.

use crate::error::DocRegenError;
use crate::html::{self, TopNode};
use crate::model::{DocumentSection, SectionMetadata, SectionType};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Parse `html` into sections. Never fails: malformed markup is normalised
/// by the HTML parser, and an empty document yields no sections.
pub fn parse_sections(html: &str) -> Vec<DocumentSection> {
    if html.trim().is_empty() {
        return Vec::new();
    }

    let doc = html::parse(html);
    let root = html::content_root(&doc);
    let nodes = html::section_nodes(root);

    let mut groups: Vec<Vec<TopNode<'_>>> = Vec::new();
    for node in nodes {
        let starts_section = matches!(
            &node,
            TopNode::Element(el) if html::heading_level(el.value().name()).is_some()
        );
        match groups.last_mut() {
            Some(current) if !starts_section => current.push(node),
            _ => groups.push(vec![node]),
        }
    }

    let mut sections: Vec<DocumentSection> = groups
        .iter()
        .enumerate()
        .map(|(order_index, group)| build_section(order_index, group))
        .collect();

    link_hierarchy(&mut sections);

    info!("Parsed HTML into {} sections", sections.len());
    sections
}

/// Parse raw bytes, rejecting input that is clearly not HTML.
pub fn parse_bytes(bytes: &[u8]) -> Result<Vec<DocumentSection>, DocRegenError> {
    if bytes.starts_with(b"%PDF") {
        return Err(DocRegenError::NotHtml {
            reason: "input is a PDF file; convert it to HTML first".into(),
        });
    }
    if bytes.starts_with(b"PK\x03\x04") {
        return Err(DocRegenError::NotHtml {
            reason: "input is a ZIP container (DOCX?); convert it to HTML first".into(),
        });
    }
    if bytes.contains(&0) {
        return Err(DocRegenError::NotHtml {
            reason: "input contains NUL bytes".into(),
        });
    }
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|e| DocRegenError::NotHtml {
        reason: format!("input is not valid UTF-8: {e}"),
    })?;
    Ok(parse_sections(text))
}

/// Concatenate the HTML of the top-level sections, each followed by its
/// descendants depth-first.
pub fn render_tree(sections: &[DocumentSection]) -> String {
    let by_id: BTreeMap<&str, &DocumentSection> =
        sections.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut roots: Vec<&DocumentSection> = sections.iter().filter(|s| s.is_top_level()).collect();
    roots.sort_by_key(|s| s.order_index);

    let mut out = String::new();
    for root in roots {
        push_subtree(root, &by_id, &mut out);
    }
    out
}

fn push_subtree(
    section: &DocumentSection,
    by_id: &BTreeMap<&str, &DocumentSection>,
    out: &mut String,
) {
    out.push_str(&section.html_content);
    for child_id in &section.children {
        if let Some(child) = by_id.get(child_id.as_str()) {
            push_subtree(child, by_id, out);
        }
    }
}

// ── Section construction ─────────────────────────────────────────────────

pub(crate) fn section_id(order_index: usize) -> String {
    format!("sec-{:04}", order_index + 1)
}

fn build_section(order_index: usize, group: &[TopNode<'_>]) -> DocumentSection {
    let html_content: String = group
        .iter()
        .map(|node| match node {
            TopNode::Element(el) => html::serialize_element(*el),
            TopNode::Text(t) => html::escape_text(t),
        })
        .collect();

    let section_type = classify(group);
    let metadata = metadata_for(group);
    debug!(
        "Section {}: {} <{}>, {} words",
        order_index, section_type, metadata.tag_name, metadata.word_count
    );

    DocumentSection {
        id: section_id(order_index),
        html_content,
        section_type,
        order_index,
        parent_id: None,
        children: Vec::new(),
        metadata,
    }
}

fn classify(group: &[TopNode<'_>]) -> SectionType {
    #[derive(PartialEq, Clone, Copy)]
    enum Kind {
        Table,
        List,
        Text,
    }

    let kind_of = |node: &TopNode<'_>| match node {
        TopNode::Text(_) => Kind::Text,
        TopNode::Element(el) => match el.value().name() {
            "table" => Kind::Table,
            name if html::LIST_TAGS.contains(&name) => Kind::List,
            _ => Kind::Text,
        },
    };

    match group.first() {
        Some(TopNode::Element(el)) if html::heading_level(el.value().name()).is_some() => {
            SectionType::Heading
        }
        Some(first) => {
            let first_kind = kind_of(first);
            if group.iter().any(|n| kind_of(n) != first_kind) {
                return SectionType::Mixed;
            }
            match first_kind {
                Kind::Table => SectionType::Table,
                Kind::List => SectionType::List,
                Kind::Text => SectionType::ParagraphGroup,
            }
        }
        None => SectionType::Mixed,
    }
}

fn link_hierarchy(sections: &mut [DocumentSection]) {
    let mut stack: Vec<(usize, u8)> = Vec::new();
    for i in 0..sections.len() {
        if sections[i].section_type != SectionType::Heading {
            continue;
        }
        let level = sections[i].metadata.level;
        while matches!(stack.last(), Some(&(_, top)) if top >= level) {
            stack.pop();
        }
        if let Some(&(parent, _)) = stack.last() {
            let child_id = sections[i].id.clone();
            sections[i].parent_id = Some(sections[parent].id.clone());
            sections[parent].children.push(child_id);
        }
        stack.push((i, level));
    }
}

// ── Metadata ─────────────────────────────────────────────────────────────

static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

#[derive(Default)]
struct Tally {
    elements: usize,
    tables: usize,
    lists: usize,
    attributes: usize,
    max_depth: usize,
}

fn tally(el: ElementRef<'_>, depth: usize, t: &mut Tally) {
    let name = el.value().name();
    if html::is_removed(name) {
        return;
    }
    t.elements += 1;
    t.attributes += el.value().attrs().count();
    t.max_depth = t.max_depth.max(depth);
    if name == "table" {
        t.tables += 1;
    } else if html::LIST_TAGS.contains(&name) {
        t.lists += 1;
    }
    for child in el.children().filter_map(ElementRef::wrap) {
        tally(child, depth + 1, t);
    }
}

fn metadata_for(group: &[TopNode<'_>]) -> SectionMetadata {
    let mut text = String::new();
    let mut counts = Tally::default();
    for node in group {
        match node {
            TopNode::Element(el) => {
                text.push_str(&html::visible_text(*el));
                text.push(' ');
                tally(*el, 0, &mut counts);
            }
            TopNode::Text(t) => {
                text.push_str(t);
                text.push(' ');
            }
        }
    }

    let first = group.iter().find_map(|n| match n {
        TopNode::Element(el) => Some(*el),
        TopNode::Text(_) => None,
    });

    let (tag_name, classes, attributes) = match first {
        Some(el) => {
            let classes: Vec<String> = el
                .value()
                .attr("class")
                .map(|c| c.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            let attributes: BTreeMap<String, String> = el
                .value()
                .attrs()
                .filter(|(k, _)| *k != "class")
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            (el.value().name().to_string(), classes, attributes)
        }
        None => ("p".to_string(), Vec::new(), BTreeMap::new()),
    };

    let level = match group.first() {
        Some(TopNode::Element(el)) => html::heading_level(el.value().name()).unwrap_or(0),
        _ => 0,
    };

    let text_chars = html::collapse_whitespace(&text).trim().chars().count();
    let complexity_score = 1.0
        + counts.elements as f64 * 0.1
        + counts.tables as f64 * 2.0
        + counts.lists as f64 * 1.5
        + counts.attributes as f64 * 0.2
        + counts.max_depth as f64 * 0.5
        + text_chars as f64 * 0.001;

    SectionMetadata {
        level,
        tag_name,
        classes,
        attributes,
        word_count: RE_WORD.find_iter(&text).count(),
        complexity_score,
    }
}
