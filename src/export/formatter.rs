//! Title placement and cover pages, applied to the HTML before layout.
//!
//! Regenerated documents often repeat the title: once from the reference
//! document and once more when a section writer re-emits it. Top-level `<h1>`
//! elements whose text equals the configured title are removed except the
//! first. A full cover page carries the title itself, so that first one goes
//! too.

use crate::config::{CoverPageMode, ExportConfig};
use crate::html::{self, TopNode};
use scraper::ElementRef;
use tracing::debug;

/// Separator between author, organisation and date on a minimal cover.
pub const META_SEPARATOR: &str = " | ";

/// Apply duplicate-title removal and the configured cover page to `html`.
///
/// Without a title the document is returned unchanged.
pub fn format_document(html_text: &str, config: &ExportConfig) -> String {
    let Some(title) = config.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return html_text.to_string();
    };

    let doc = html::parse(html_text);
    let root = html::content_root(&doc);
    let drop_first = config.cover_page == CoverPageMode::Full;
    let mut seen = false;
    let mut removed = 0usize;
    let mut body = String::with_capacity(html_text.len());

    for node in html::content_nodes(root) {
        match node {
            TopNode::Text(t) => body.push_str(&html::escape_text(&t)),
            TopNode::Element(el) => {
                if el.value().name() == "h1" && is_title(el, title) {
                    let first = !seen;
                    seen = true;
                    if !first || drop_first {
                        removed += 1;
                        continue;
                    }
                }
                body.push_str(&html::serialize_element(el));
            }
        }
    }

    if removed > 0 {
        debug!("Removed {} duplicate title heading(s)", removed);
    }
    format!("{}{}", cover_page(title, config), body)
}

fn is_title(el: ElementRef<'_>, title: &str) -> bool {
    html::collapse_whitespace(&html::visible_text(el)).trim() == html::collapse_whitespace(title).trim()
}

/// Cover page markup for `config.cover_page`; empty for [`CoverPageMode::None`].
pub fn cover_page(title: &str, config: &ExportConfig) -> String {
    let meta: Vec<String> = [&config.author, &config.organization, &config.date]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(html::escape_text)
        .collect();
    let title = html::escape_text(title);

    match config.cover_page {
        CoverPageMode::None => String::new(),
        CoverPageMode::Minimal => {
            let mut out = format!("<h1 style=\"text-align: center\">{title}</h1>");
            if !meta.is_empty() {
                out.push_str(&format!(
                    "<p style=\"text-align: center\">{}</p>",
                    meta.join(META_SEPARATOR)
                ));
            }
            out.push_str("<hr>");
            out
        }
        CoverPageMode::Full => {
            let mut out =
                format!("<h1 style=\"text-align: center; font-size: 28pt\">{title}</h1>");
            for line in &meta {
                out.push_str(&format!(
                    "<p style=\"text-align: center; font-size: 14pt\">{line}</p>"
                ));
            }
            out.push_str("<div style=\"page-break-after: always\"></div>");
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: CoverPageMode) -> ExportConfig {
        ExportConfig::builder()
            .title("Annual Report")
            .cover_page(mode)
            .author("Ada")
            .date("2026-10-18")
            .build()
            .unwrap()
    }

    #[test]
    fn duplicate_titles_keep_first() {
        let html = "<h1>Annual Report</h1><p>a</p><h1>Annual  Report</h1><h1>Other</h1>";
        let out = format_document(html, &config(CoverPageMode::None));
        assert_eq!(out.matches("Annual Report").count(), 1);
        assert!(out.contains("<h1>Other</h1>"));
    }

    #[test]
    fn no_title_leaves_document_alone() {
        let html = "<h1>A</h1><h1>A</h1>";
        assert_eq!(format_document(html, &ExportConfig::default()), html);
    }

    #[test]
    fn minimal_cover_has_meta_line_and_rule() {
        let out = format_document("<p>x</p>", &config(CoverPageMode::Minimal));
        assert!(out.starts_with("<h1 style=\"text-align: center\">Annual Report</h1>"));
        assert!(out.contains("Ada | 2026-10-18"));
        assert!(out.contains("<hr>"));
    }

    #[test]
    fn full_cover_drops_body_title() {
        let out = format_document("<h1>Annual Report</h1><p>x</p>", &config(CoverPageMode::Full));
        assert_eq!(out.matches("Annual Report").count(), 1);
        assert!(out.contains("page-break-after: always"));
        assert!(out.ends_with("<p>x</p>"));
    }

    #[test]
    fn rules_and_page_breaks_survive_title_handling() {
        let html = "<h1>Report</h1><p>a</p><hr><div class=\"page-break\"></div>\
                    <div style=\"page-break-after: always\"></div><p>b</p>";
        let out = format_document(html, &config(CoverPageMode::Minimal));
        assert!(out.contains("<p>a</p><hr><div class=\"page-break\"></div>"));
        assert!(out.contains("<div style=\"page-break-after: always\"></div><p>b</p>"));
    }

    #[test]
    fn cover_text_is_escaped() {
        let cfg = ExportConfig::builder()
            .title("R&D <2026>")
            .cover_page(CoverPageMode::Minimal)
            .build()
            .unwrap();
        let out = cover_page("R&D <2026>", &cfg);
        assert!(out.contains("R&amp;D &lt;2026&gt;"));
    }
}
