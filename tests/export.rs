//! Integration tests for the Export Reconciler: the PDF and DOCX renderings
//! of one document must agree on structure and styling.

use edgequake_docregen::export::style::pt_to_half_points;
use edgequake_docregen::{
    render, render_all, CoverPageMode, ExportConfig, ExportFormat, StyleSheet,
};
use lopdf::{Dictionary, Document, Object, ObjectId};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};

const TABLE_DOC: &str = r#"
<h1>Architecture</h1>
<p>The platform is split into three layers.</p>
<table>
  <thead><tr><th>Layer</th><th>Technology</th><th>Owner</th></tr></thead>
  <tbody>
    <tr><td>Frontend</td><td>Next.js</td><td>Web team</td></tr>
    <tr><td>Backend</td><td>Rust</td><td>Platform team</td></tr>
    <tr><td>Storage</td><td>PostgreSQL</td><td>Data team</td></tr>
  </tbody>
</table>
"#;

// ── PDF helpers ──────────────────────────────────────────────────────────────

/// One entry per `TR` structure element: (is header row, cell count).
fn pdf_rows(bytes: &[u8]) -> Vec<(bool, usize)> {
    let doc = Document::load_mem(bytes).unwrap();
    let elems: BTreeMap<ObjectId, &Dictionary> = doc
        .objects
        .iter()
        .filter_map(|(id, o)| o.as_dict().ok().map(|d| (*id, d)))
        .filter(|(_, d)| d.get(b"Type").and_then(|t| t.as_name()).ok() == Some(b"StructElem".as_slice()))
        .collect();
    let tag = |d: &Dictionary| {
        d.get(b"S")
            .and_then(|s| s.as_name())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .unwrap_or_default()
    };

    elems
        .values()
        .filter(|d| tag(d) == "TR")
        .map(|tr| {
            let kids = tr.get(b"K").and_then(|k| k.as_array()).unwrap();
            let cells: Vec<String> = kids
                .iter()
                .filter_map(|k| match k {
                    Object::Reference(id) => elems.get(id).map(|d| tag(d)),
                    _ => None,
                })
                .collect();
            (cells.iter().any(|c| c == "TH"), cells.len())
        })
        .collect()
}

/// Every font size selected with `Tf` across all pages.
fn pdf_font_sizes(bytes: &[u8]) -> BTreeSet<i64> {
    let doc = Document::load_mem(bytes).unwrap();
    let mut sizes = BTreeSet::new();
    for page_id in doc.get_pages().values() {
        let content = doc.get_and_decode_page_content(*page_id).unwrap();
        for op in content.operations.iter().filter(|op| op.operator == "Tf") {
            let size = op.operands[1].as_float().unwrap();
            sizes.insert((size * 10.0).round() as i64);
        }
    }
    sizes
}

/// Number of structure elements tagged `tag`.
fn pdf_tag_count(bytes: &[u8], tag: &[u8]) -> usize {
    let doc = Document::load_mem(bytes).unwrap();
    doc.objects
        .values()
        .filter_map(|o| o.as_dict().ok())
        .filter(|d| d.get(b"Type").and_then(|t| t.as_name()).ok() == Some(b"StructElem".as_slice()))
        .filter(|d| d.get(b"S").and_then(|s| s.as_name()).ok() == Some(tag))
        .count()
}

/// Whether any `Tj` on the page shows exactly `text`.
fn pdf_page_shows(doc: &Document, page: ObjectId, text: &[u8]) -> bool {
    doc.get_and_decode_page_content(page)
        .unwrap()
        .operations
        .iter()
        .filter(|op| op.operator == "Tj")
        .any(|op| matches!(&op.operands[0], Object::String(s, _) if s.as_slice() == text))
}

// ── DOCX helpers ─────────────────────────────────────────────────────────────

fn docx_part(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut s = String::new();
    file.read_to_string(&mut s).unwrap();
    s
}

/// One entry per `w:tr`: (has `w:tblHeader`, cell count).
fn docx_rows(bytes: &[u8]) -> Vec<(bool, usize)> {
    let xml = docx_part(bytes, "word/document.xml");
    let mut reader = Reader::from_str(&xml);
    let mut rows = Vec::new();
    let mut current: Option<(bool, usize)> = None;

    loop {
        match reader.read_event().unwrap() {
            Event::Start(e) if e.name().as_ref() == b"w:tr" => current = Some((false, 0)),
            Event::Start(e) if e.name().as_ref() == b"w:tc" => {
                if let Some(row) = current.as_mut() {
                    row.1 += 1;
                }
            }
            Event::Empty(e) if e.name().as_ref() == b"w:tblHeader" => {
                if let Some(row) = current.as_mut() {
                    row.0 = true;
                }
            }
            Event::End(e) if e.name().as_ref() == b"w:tr" => {
                if let Some(row) = current.take() {
                    rows.push(row);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    rows
}

/// Every `w:sz` value in the document body, in half-points.
fn docx_font_sizes(bytes: &[u8]) -> BTreeSet<i64> {
    let xml = docx_part(bytes, "word/document.xml");
    let mut reader = Reader::from_str(&xml);
    let mut sizes = BTreeSet::new();
    loop {
        match reader.read_event().unwrap() {
            Event::Empty(e) if e.name().as_ref() == b"w:sz" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"w:val" {
                        let v = String::from_utf8_lossy(&attr.value).parse::<i64>().unwrap();
                        sizes.insert(v);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    sizes
}

// ── Format parity ────────────────────────────────────────────────────────────

#[test]
fn both_formats_encode_one_header_row_and_equal_cell_counts() {
    let config = ExportConfig::default();
    let pdf = render(TABLE_DOC, ExportFormat::Pdf, &config).unwrap();
    let docx = render(TABLE_DOC, ExportFormat::Docx, &config).unwrap();

    let pdf_rows = pdf_rows(&pdf);
    let docx_rows = docx_rows(&docx);

    assert_eq!(pdf_rows.len(), 4);
    assert_eq!(pdf_rows.iter().filter(|(h, _)| *h).count(), 1);
    assert!(pdf_rows.iter().all(|(_, n)| *n == 3), "pdf rows: {pdf_rows:?}");

    assert_eq!(docx_rows.len(), 4);
    assert_eq!(docx_rows.iter().filter(|(h, _)| *h).count(), 1);
    assert!(docx_rows.iter().all(|(_, n)| *n == 3), "docx rows: {docx_rows:?}");
}

#[test]
fn header_row_without_thead_is_detected_in_both_formats() {
    let html = "<table><tr><th>K</th><th>V</th></tr><tr><td>a</td><td>1</td></tr></table>";
    let config = ExportConfig::default();
    let pdf_rows = pdf_rows(&render(html, ExportFormat::Pdf, &config).unwrap());
    let docx_rows = docx_rows(&render(html, ExportFormat::Docx, &config).unwrap());

    assert_eq!(pdf_rows, vec![(true, 2), (false, 2)]);
    assert_eq!(docx_rows, vec![(true, 2), (false, 2)]);
}

#[test]
fn heading_and_body_sizes_match_across_formats() {
    let style = StyleSheet::default();
    let config = ExportConfig::builder().style(style.clone()).build().unwrap();
    let html = "<h1>Title</h1><h2>Scope</h2><p>Body text.</p>";

    let pdf_sizes = pdf_font_sizes(&render(html, ExportFormat::Pdf, &config).unwrap());
    let docx_sizes = docx_font_sizes(&render(html, ExportFormat::Docx, &config).unwrap());

    for pt in [style.heading_size(1), style.heading_size(2), style.font_size_pt] {
        assert!(
            pdf_sizes.contains(&((pt * 10.0).round() as i64)),
            "pdf missing {pt}pt in {pdf_sizes:?}"
        );
        assert!(
            docx_sizes.contains(&pt_to_half_points(pt)),
            "docx missing {pt}pt in {docx_sizes:?}"
        );
    }
}

#[test]
fn custom_body_size_applies_to_both_formats() {
    let config = ExportConfig::builder().font_size_pt(10.0).build().unwrap();
    let html = "<p>Small print.</p>";

    let pdf_sizes = pdf_font_sizes(&render(html, ExportFormat::Pdf, &config).unwrap());
    let docx_sizes = docx_font_sizes(&render(html, ExportFormat::Docx, &config).unwrap());

    assert!(pdf_sizes.contains(&100));
    assert!(docx_sizes.contains(&20));
}

// ── Failure isolation ────────────────────────────────────────────────────────

#[test]
fn unsupported_css_fails_each_requested_format() {
    let html = "<p>ok</p><div style=\"display: grid\"><p>x</p></div>";
    for format in [ExportFormat::Pdf, ExportFormat::Docx] {
        let err = render(html, format, &ExportConfig::default()).unwrap_err();
        assert_eq!(err.export_format(), Some(format));
    }
}

#[tokio::test]
async fn characters_outside_win_ansi_fail_only_the_pdf() {
    let html = "<h1>Report</h1><p>Region: 東京</p>";
    let results = render_all(
        html,
        &[ExportFormat::Pdf, ExportFormat::Docx],
        &ExportConfig::default(),
    )
    .await;

    let (pdf_format, pdf) = &results[0];
    let (docx_format, docx) = &results[1];
    assert_eq!(*pdf_format, ExportFormat::Pdf);
    assert_eq!(*docx_format, ExportFormat::Docx);
    assert_eq!(pdf.as_ref().unwrap_err().export_format(), Some(ExportFormat::Pdf));
    let docx = docx.as_ref().unwrap();
    assert!(docx_part(docx, "word/document.xml").contains("東京"));
}

// ── Cover pages ──────────────────────────────────────────────────────────────

#[test]
fn full_cover_page_breaks_before_the_body_in_both_formats() {
    let config = ExportConfig::builder()
        .title("FinStack Architecture")
        .cover_page(CoverPageMode::Full)
        .author("Platform Team")
        .build()
        .unwrap();
    let html = "<h1>FinStack Architecture</h1><p>Body.</p>";

    let pdf = render(html, ExportFormat::Pdf, &config).unwrap();
    let doc = Document::load_mem(&pdf).unwrap();
    assert_eq!(doc.get_pages().len(), 2);

    let docx = render(html, ExportFormat::Docx, &config).unwrap();
    let body = docx_part(&docx, "word/document.xml");
    assert!(body.contains("<w:br w:type=\"page\"/>"));
    assert_eq!(body.matches("FinStack Architecture").count(), 1);
    assert!(body.contains("Platform Team"));
}

// ── Nested blocks ────────────────────────────────────────────────────────────

const NESTED_DOC: &str = r#"
<ul><li>Limits<table><tr><th>K</th><th>V</th></tr><tr><td>a</td><td>1</td></tr></table></li></ul>
<blockquote><table><tr><th>Quoted</th></tr><tr><td>q</td></tr></table></blockquote>
<table>
  <tr><th>Outer</th></tr>
  <tr><td>cell<table><tr><th>Inner</th></tr><tr><td>x</td></tr></table></td></tr>
</table>
"#;

#[test]
fn tables_in_lists_quotes_and_cells_stay_tables_in_both_formats() {
    let config = ExportConfig::default();

    let pdf = render(NESTED_DOC, ExportFormat::Pdf, &config).unwrap();
    assert_eq!(pdf_tag_count(&pdf, b"Table"), 4);
    assert_eq!(pdf_tag_count(&pdf, b"TR"), 8);
    assert_eq!(pdf_tag_count(&pdf, b"TH"), 5);
    assert_eq!(pdf_tag_count(&pdf, b"BlockQuote"), 1);

    let docx = render(NESTED_DOC, ExportFormat::Docx, &config).unwrap();
    let body = docx_part(&docx, "word/document.xml");
    assert_eq!(body.matches("<w:tbl>").count(), 4);
    assert_eq!(body.matches("<w:tr>").count(), 8);
    assert_eq!(body.matches("<w:tblHeader/>").count(), 4);
    for text in ["Limits", "Quoted", "Inner", ">x<"] {
        assert!(body.contains(text), "docx missing {text}");
    }
}

#[test]
fn titled_export_keeps_rules_and_page_breaks() {
    let config = ExportConfig::builder()
        .title("Report")
        .cover_page(CoverPageMode::Minimal)
        .build()
        .unwrap();
    let html = "<h1>Report</h1><p>a</p><hr><p>b</p><div class=\"page-break\"></div><p>c</p>";

    let pdf = render(html, ExportFormat::Pdf, &config).unwrap();
    let doc = Document::load_mem(&pdf).unwrap();
    let pages: Vec<ObjectId> = doc.get_pages().values().copied().collect();
    assert_eq!(pages.len(), 2);
    assert!(pdf_page_shows(&doc, pages[1], b"c"));

    let docx = render(html, ExportFormat::Docx, &config).unwrap();
    let body = docx_part(&docx, "word/document.xml");
    assert_eq!(body.matches("<w:br w:type=\"page\"/>").count(), 1);
    // One rule under the cover title, one from the body.
    assert_eq!(body.matches("<w:pBdr>").count(), 2);
}

#[test]
fn pdf_rows_taller_than_a_page_split_under_a_repeated_header() {
    let html = format!(
        "<table><thead><tr><th>Field</th><th>Notes</th></tr></thead>\
         <tbody><tr><td>history</td><td>{}</td></tr></tbody></table>",
        "the quick brown fox ".repeat(1500)
    );
    let pdf = render(&html, ExportFormat::Pdf, &ExportConfig::default()).unwrap();

    assert_eq!(pdf_rows(&pdf), vec![(true, 2), (false, 2)]);
    let doc = Document::load_mem(&pdf).unwrap();
    let pages: Vec<ObjectId> = doc.get_pages().values().copied().collect();
    assert!(pages.len() > 2, "only {} pages", pages.len());
    for page in pages {
        assert!(pdf_page_shows(&doc, page, b"Field"));
    }
}
