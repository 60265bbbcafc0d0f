//! DOM helpers shared by the parser, the output validator, the assembler and
//! the export layout.
//!
//! Parsing goes through `scraper` (html5ever), which never fails: unclosed
//! tags are auto-closed and stray end tags dropped. Everything the pipeline
//! hands to the next stage is re-serialised by [`serialize_element`], so
//! fragments are always explicitly closed, comment-free and free of
//! `script`/`style` content.
//!
//! [`check_well_formed`] is the strict counterpart used on text that did *not*
//! come out of the serializer (LLM output, concatenated documents).

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

/// Elements that never have content or an end tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements dropped entirely during cleaning.
pub const REMOVED_ELEMENTS: &[&str] = &["script", "style", "iframe", "noscript", "template"];

pub const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

pub const LIST_TAGS: &[&str] = &["ul", "ol", "dl"];

/// Containers that only group content. Sections may start inside them.
pub const WRAPPER_TAGS: &[&str] = &[
    "div", "section", "article", "main", "header", "footer", "aside", "nav",
];

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

pub fn is_removed(name: &str) -> bool {
    REMOVED_ELEMENTS.contains(&name)
}

/// Heading level for `h1`..`h6`, `None` for anything else.
pub fn heading_level(name: &str) -> Option<u8> {
    let bytes = name.as_bytes();
    if bytes.len() == 2 && (bytes[0] == b'h' || bytes[0] == b'H') && (b'1'..=b'6').contains(&bytes[1]) {
        Some(bytes[1] - b'0')
    } else {
        None
    }
}

static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

/// Parse `html` as a document. Fragments end up inside an implied `<body>`.
pub fn parse(html: &str) -> Html {
    Html::parse_document(html)
}

/// The element whose children are the document content: `<body>` when
/// present, the root element otherwise.
pub fn content_root(doc: &Html) -> ElementRef<'_> {
    doc.select(&BODY).next().unwrap_or_else(|| doc.root_element())
}

/// A direct child of the content root, after cleaning.
#[derive(Debug, Clone)]
pub enum TopNode<'a> {
    Element(ElementRef<'a>),
    /// Loose inline text, whitespace already collapsed.
    Text(String),
}

/// Meaningful children of `root`: comments, removed elements,
/// whitespace-only text and empty non-void elements are skipped.
pub fn top_level_nodes<'a>(root: ElementRef<'a>) -> Vec<TopNode<'a>> {
    let mut out = Vec::new();
    for child in root.children() {
        match child.value() {
            Node::Text(t) => {
                let collapsed = collapse_whitespace(t);
                if !collapsed.trim().is_empty() {
                    out.push(TopNode::Text(collapsed));
                }
            }
            Node::Element(e) => {
                if is_removed(e.name()) {
                    continue;
                }
                if let Some(el) = ElementRef::wrap(child) {
                    if is_meaningful(el) {
                        out.push(TopNode::Element(el));
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Every child of `root` that survives cleaning, including void elements
/// such as `<hr>` and empty elements such as page-break markers.
pub fn content_nodes<'a>(root: ElementRef<'a>) -> Vec<TopNode<'a>> {
    let mut out = Vec::new();
    for child in root.children() {
        match child.value() {
            Node::Text(t) => {
                let collapsed = collapse_whitespace(t);
                if !collapsed.trim().is_empty() {
                    out.push(TopNode::Text(collapsed));
                }
            }
            Node::Element(e) if !is_removed(e.name()) => {
                out.extend(ElementRef::wrap(child).map(TopNode::Element));
            }
            _ => {}
        }
    }
    out
}

/// Like [`top_level_nodes`], but a wrapper that holds a heading is replaced
/// by its own children, recursively. Headings nested in `<div>`, `<section>`
/// or `<article>` thereby become top-level nodes; the wrapper tags are lost.
pub fn section_nodes<'a>(root: ElementRef<'a>) -> Vec<TopNode<'a>> {
    let mut out = Vec::new();
    for node in top_level_nodes(root) {
        match node {
            TopNode::Element(el) if holds_heading(el) => out.extend(section_nodes(el)),
            other => out.push(other),
        }
    }
    out
}

/// A wrapper with a heading among its children or inside nested wrappers.
fn holds_heading(el: ElementRef<'_>) -> bool {
    WRAPPER_TAGS.contains(&el.value().name())
        && el
            .children()
            .filter_map(ElementRef::wrap)
            .any(|c| heading_level(c.value().name()).is_some() || holds_heading(c))
}

/// An element carries content when it has visible text or embeds media.
pub fn is_meaningful(el: ElementRef<'_>) -> bool {
    let name = el.value().name();
    if name == "img" || name == "table" {
        return true;
    }
    if is_void(name) {
        return false;
    }
    if !visible_text(el).trim().is_empty() {
        return true;
    }
    el.descendants()
        .filter_map(ElementRef::wrap)
        .any(|d| matches!(d.value().name(), "img" | "table"))
}

/// Text of `el`, skipping removed elements.
pub fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) if !is_removed(e.name()) => {
                if let Some(c) = ElementRef::wrap(child) {
                    collect_text(c, out);
                }
            }
            _ => {}
        }
    }
}

/// Serialise `el` with cleaning applied. Output is always balanced.
pub fn serialize_element(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    write_element(el, &mut out, false);
    out
}

fn write_element(el: ElementRef<'_>, out: &mut String, in_pre: bool) {
    let element = el.value();
    let name = element.name();
    if is_removed(name) {
        return;
    }
    out.push('<');
    out.push_str(name);
    for (key, value) in element.attrs() {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');
    if is_void(name) {
        return;
    }
    let in_pre = in_pre || name == "pre" || name == "textarea";
    for child in el.children() {
        match child.value() {
            Node::Text(t) => {
                if in_pre {
                    out.push_str(&escape_text(t));
                } else {
                    out.push_str(&escape_text(&collapse_whitespace(t)));
                }
            }
            Node::Element(_) => {
                if let Some(c) = ElementRef::wrap(child) {
                    write_element(c, out, in_pre);
                }
            }
            _ => {}
        }
    }
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

static WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

pub fn collapse_whitespace(s: &str) -> String {
    WS.replace_all(s, " ").into_owned()
}

pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(c),
        }
    }
    out
}

// ── Well-formedness ──────────────────────────────────────────────────────

static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->|<![^>]*>|<\?[^>]*>").unwrap());

static RE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<(/)?([A-Za-z][A-Za-z0-9:-]*)((?:[^>"']|"[^"]*"|'[^']*')*?)(/)?>"#).unwrap()
});

/// Strictly check that every non-void element in `fragment` is closed in
/// order. Returns a human-readable reason on failure.
pub fn check_well_formed(fragment: &str) -> Result<(), String> {
    let stripped = RE_COMMENT.replace_all(fragment, "");
    let mut stack: Vec<String> = Vec::new();
    for caps in RE_TAG.captures_iter(&stripped) {
        let closing = caps.get(1).is_some();
        let name = caps[2].to_ascii_lowercase();
        let self_closing = caps.get(4).is_some();
        if is_void(&name) {
            continue;
        }
        if closing {
            match stack.pop() {
                Some(open) if open == name => {}
                Some(open) => {
                    return Err(format!("unexpected </{name}> while <{open}> is open"));
                }
                None => return Err(format!("unexpected </{name}> with no open element")),
            }
        } else if !self_closing {
            stack.push(name);
        }
    }
    match stack.pop() {
        Some(open) => Err(format!("<{open}> is never closed")),
        None => Ok(()),
    }
}

// ── DOM equivalence ──────────────────────────────────────────────────────

/// Canonical rendering of the DOM of `html`: element names, sorted
/// attributes and whitespace-collapsed text, ignoring inter-element
/// whitespace. Two inputs are DOM-equivalent iff their fingerprints match.
pub fn dom_fingerprint(html: &str) -> String {
    let doc = parse(html);
    let root = content_root(&doc);
    let mut out = String::new();
    fingerprint_children(root, &mut out);
    out
}

fn fingerprint_children(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => {
                let text = collapse_whitespace(t);
                let text = text.trim();
                if !text.is_empty() {
                    out.push('"');
                    out.push_str(text);
                    out.push('"');
                }
            }
            Node::Element(e) => {
                if is_removed(e.name()) {
                    continue;
                }
                let mut attrs: Vec<(&str, &str)> = e.attrs().collect();
                attrs.sort_unstable();
                out.push('(');
                out.push_str(e.name());
                for (k, v) in attrs {
                    out.push_str(&format!(" {k}={v:?}"));
                }
                if let Some(c) = ElementRef::wrap(child) {
                    fingerprint_children(c, out);
                }
                out.push(')');
            }
            _ => {}
        }
    }
}

/// Counts of the structural elements present in a fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructureCounts {
    pub headings: usize,
    pub tables: usize,
    pub lists: usize,
}

impl StructureCounts {
    pub fn of(fragment: &str) -> Self {
        let doc = parse(fragment);
        let mut counts = Self::default();
        for el in content_root(&doc).descendants().filter_map(ElementRef::wrap) {
            let name = el.value().name();
            if heading_level(name).is_some() {
                counts.headings += 1;
            } else if name == "table" {
                counts.tables += 1;
            } else if LIST_TAGS.contains(&name) {
                counts.lists += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_levels() {
        assert_eq!(heading_level("h1"), Some(1));
        assert_eq!(heading_level("H6"), Some(6));
        assert_eq!(heading_level("h7"), None);
        assert_eq!(heading_level("hr"), None);
    }

    #[test]
    fn serializer_closes_unclosed_tags() {
        let doc = parse("<div><p>one<p>two</div>");
        let root = content_root(&doc);
        let nodes = top_level_nodes(root);
        let TopNode::Element(div) = &nodes[0] else {
            panic!("expected element");
        };
        let html = serialize_element(*div);
        assert_eq!(html, "<div><p>one</p><p>two</p></div>");
        assert!(check_well_formed(&html).is_ok());
    }

    #[test]
    fn serializer_drops_scripts_and_comments() {
        let doc = parse("<p>a<!-- hidden --><script>alert(1)</script>  b</p>");
        let nodes = top_level_nodes(content_root(&doc));
        let TopNode::Element(p) = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(serialize_element(*p), "<p>a b</p>");
    }

    #[test]
    fn pre_keeps_whitespace() {
        let doc = parse("<pre>fn  main()\n    {}</pre>");
        let nodes = top_level_nodes(content_root(&doc));
        let TopNode::Element(pre) = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(serialize_element(*pre), "<pre>fn  main()\n    {}</pre>");
    }

    #[test]
    fn empty_elements_are_not_meaningful() {
        let doc = parse("<p>  </p><div></div><hr><p>x</p>");
        let nodes = top_level_nodes(content_root(&doc));
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn content_nodes_keep_rules_and_empty_markers() {
        let doc = parse("<p>a</p><hr><div class=\"page-break\"></div><!-- c --><script>x</script><p>b</p>");
        let nodes = content_nodes(content_root(&doc));
        assert_eq!(nodes.len(), 4);
        assert_eq!(top_level_nodes(content_root(&doc)).len(), 2);
    }

    #[test]
    fn wrappers_holding_headings_are_unwrapped() {
        let doc = parse(
            "<main><article><h1>A</h1><div class=\"note\"><p>x</p></div></article></main><p>tail</p>",
        );
        let nodes = section_nodes(content_root(&doc));
        let names: Vec<String> = nodes
            .iter()
            .map(|n| match n {
                TopNode::Element(el) => el.value().name().to_string(),
                TopNode::Text(t) => t.clone(),
            })
            .collect();
        assert_eq!(names, vec!["h1", "div", "p"]);
    }

    #[test]
    fn well_formed_accepts_voids_and_self_closing() {
        assert!(check_well_formed("<p>a<br>b<img src=\"x.png\"/></p>").is_ok());
        assert!(check_well_formed("<div class='a>b'><span/></div>").is_ok());
    }

    #[test]
    fn well_formed_rejects_misnesting() {
        let err = check_well_formed("<p><b>x</p></b>").unwrap_err();
        assert!(err.contains("</p>"), "got: {err}");
        assert!(check_well_formed("<table><tr><td>x</td></tr>").is_err());
        assert!(check_well_formed("</div>").is_err());
    }

    #[test]
    fn fingerprint_ignores_formatting_whitespace() {
        let a = "<h1>A</h1>\n<p>x   y</p>";
        let b = "<h1>A</h1><p>x y</p>";
        assert_eq!(dom_fingerprint(a), dom_fingerprint(b));
        assert_ne!(dom_fingerprint(a), dom_fingerprint("<h2>A</h2><p>x y</p>"));
    }

    #[test]
    fn structure_counts() {
        let c = StructureCounts::of("<h2>T</h2><ul><li>a</li></ul><table><tr><td>1</td></tr></table>");
        assert_eq!(c, StructureCounts { headings: 1, tables: 1, lists: 1 });
    }
}
