//! HTML → format-neutral block model.
//!
//! Both renderers consume the same [`Layout`], so every decision about what a
//! piece of HTML *is* (a header row, a nested list, a bold run) is taken once,
//! here. Renderers only decide how a block looks, and they read that from the
//! shared [`crate::export::style::StyleSheet`].
//!
//! Inline `style` attributes are honoured for weight, slant, underline, font
//! family, font size, alignment and page breaks. Declarations that would need
//! a real CSS layout engine (absolute positioning, floats, flex/grid,
//! transforms) are rejected with [`UnsupportedStyle`].

use crate::html::{self, heading_level, is_removed};
use scraper::node::Node;
use scraper::ElementRef;
use thiserror::Error;

/// An inline `style` declaration neither renderer can reproduce.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported CSS '{declaration}' on <{element}>")]
pub struct UnsupportedStyle {
    pub element: String,
    pub declaration: String,
}

/// Character formatting of one text run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    /// Inline code; rendered in the code font.
    pub code: bool,
    /// Font family from inline CSS, first family only.
    pub family: Option<String>,
    /// Font size from inline CSS in points.
    pub size_pt: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text { text: String, style: RunStyle },
    LineBreak,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading {
        level: u8,
        content: Vec<Inline>,
        align: Align,
    },
    Paragraph {
        content: Vec<Inline>,
        align: Align,
    },
    List(List),
    Table(Table),
    /// Preformatted text, line breaks and indentation preserved.
    Code(String),
    /// Quoted blocks, indented one list step.
    Quote(Vec<Block>),
    Rule,
    PageBreak,
}

#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub ordered: bool,
    /// First number of an ordered list.
    pub start: usize,
    pub items: Vec<ListItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    /// Text next to the label.
    pub content: Vec<Inline>,
    /// Nested lists, tables and later paragraphs, in document order.
    pub children: Vec<Block>,
}

/// A table normalised to a rectangular grid.
///
/// Every row spans exactly `columns` grid columns (short rows are padded
/// with empty cells) and header rows come first.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: usize,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub header: bool,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub content: Vec<Block>,
    pub colspan: usize,
    pub header: bool,
}

impl Row {
    /// Grid columns covered by this row.
    pub fn width(&self) -> usize {
        self.cells.iter().map(|c| c.colspan).sum()
    }
}

/// Bullets by nesting depth; all three are in the WinAnsi repertoire.
pub const BULLETS: [&str; 3] = ["\u{2022}", "\u{2013}", "\u{00B7}"];

impl List {
    /// Label of item `index` (0-based) at nesting `depth`.
    pub fn label(&self, index: usize, depth: usize) -> String {
        if self.ordered {
            format!("{}.", self.start + index)
        } else {
            BULLETS[depth % BULLETS.len()].to_string()
        }
    }
}

impl Table {
    pub fn header_rows(&self) -> usize {
        self.rows.iter().take_while(|r| r.header).count()
    }
}

/// The laid-out document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    pub blocks: Vec<Block>,
}

impl Layout {
    /// Every table in document order, nested ones included.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        let mut out = Vec::new();
        collect_tables(&self.blocks, &mut out);
        out.into_iter()
    }
}

fn collect_tables<'a>(blocks: &'a [Block], out: &mut Vec<&'a Table>) {
    for block in blocks {
        match block {
            Block::Table(table) => {
                out.push(table);
                for cell in table.rows.iter().flat_map(|r| &r.cells) {
                    collect_tables(&cell.content, out);
                }
            }
            Block::List(list) => {
                for item in &list.items {
                    collect_tables(&item.children, out);
                }
            }
            Block::Quote(inner) => collect_tables(inner, out),
            _ => {}
        }
    }
}

/// Lay out `html`. `body_pt` is the size relative CSS units resolve against.
pub fn layout(html_text: &str, body_pt: f32) -> Result<Layout> {
    let doc = html::parse(html_text);
    let root = html::content_root(&doc);
    let walker = Walker { body_pt };
    let mut blocks = Vec::new();
    walker.blocks(root, &RunStyle::default(), &mut blocks)?;
    Ok(Layout { blocks })
}

/// Concatenated text of `runs`, line breaks as `\n`.
pub fn plain_text(runs: &[Inline]) -> String {
    let mut out = String::new();
    for run in runs {
        match run {
            Inline::Text { text, .. } => out.push_str(text),
            Inline::LineBreak => out.push('\n'),
        }
    }
    out
}

const BLOCK_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "div", "section", "article", "main", "header",
    "footer", "nav", "aside", "figure", "figcaption", "address", "ul", "ol", "dl", "dt", "dd",
    "li", "table", "pre", "blockquote", "hr", "center", "form", "fieldset", "details", "summary",
    "body", "html",
];

fn is_block(name: &str) -> bool {
    BLOCK_TAGS.contains(&name)
}

/// Inside a list item, elements that must stay blocks: lists, tables,
/// code, quotations, and containers wrapping a table.
fn holds_blocks(el: ElementRef<'_>) -> bool {
    let name = el.value().name();
    matches!(name, "ul" | "ol" | "table" | "pre" | "blockquote")
        || (is_block(name)
            && el
                .descendants()
                .filter_map(ElementRef::wrap)
                .any(|d| d.value().name() == "table"))
}

type Result<T> = std::result::Result<T, UnsupportedStyle>;

struct Walker {
    body_pt: f32,
}

impl Walker {
    /// Lay out the children of a block container.
    fn blocks(&self, parent: ElementRef<'_>, base: &RunStyle, out: &mut Vec<Block>) -> Result<()> {
        let mut pending = Vec::new();
        for child in parent.children() {
            match child.value() {
                Node::Text(t) => push_text(&mut pending, t, base),
                Node::Element(e) if !is_removed(e.name()) => {
                    let Some(el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if is_block(e.name()) {
                        flush(&mut pending, out);
                        self.block(el, base, out)?;
                    } else {
                        self.inline(el, base, &mut pending)?;
                    }
                }
                _ => {}
            }
        }
        flush(&mut pending, out);
        Ok(())
    }

    fn block(&self, el: ElementRef<'_>, base: &RunStyle, out: &mut Vec<Block>) -> Result<()> {
        let name = el.value().name();
        let css = self.css(el, base)?;
        let style = css.apply(base);
        if css.break_before {
            out.push(Block::PageBreak);
        }

        match name {
            _ if heading_level(name).is_some() => {
                let content = self.runs(el, &style)?;
                if !content.is_empty() {
                    out.push(Block::Heading {
                        level: heading_level(name).unwrap_or(1),
                        content,
                        align: css.align.unwrap_or_default(),
                    });
                }
            }
            "p" | "figcaption" | "address" | "summary" | "dd" => {
                let content = self.runs(el, &style)?;
                if !content.is_empty() {
                    out.push(Block::Paragraph {
                        content,
                        align: css.align.unwrap_or_default(),
                    });
                }
            }
            "dt" => {
                let bold = RunStyle {
                    bold: true,
                    ..style.clone()
                };
                let content = self.runs(el, &bold)?;
                if !content.is_empty() {
                    out.push(Block::Paragraph {
                        content,
                        align: css.align.unwrap_or_default(),
                    });
                }
            }
            "ul" | "ol" => {
                let list = self.list(el, &style)?;
                if !list.items.is_empty() {
                    out.push(Block::List(list));
                }
            }
            "table" => self.table(el, &style, out)?,
            "pre" => {
                let text = html::visible_text(el);
                let text = text.trim_start_matches(['\r', '\n']).trim_end().replace('\t', "    ");
                if !text.is_empty() {
                    out.push(Block::Code(text));
                }
            }
            "blockquote" => {
                let mut inner = Vec::new();
                self.blocks(el, &style, &mut inner)?;
                if !inner.is_empty() {
                    out.push(Block::Quote(inner));
                }
            }
            "hr" => out.push(Block::Rule),
            _ => self.blocks(el, &style, out)?,
        }

        if css.break_after {
            out.push(Block::PageBreak);
        }
        Ok(())
    }

    /// Runs of an element whose whole content is inline.
    fn runs(&self, el: ElementRef<'_>, style: &RunStyle) -> Result<Vec<Inline>> {
        let mut raw = Vec::new();
        self.children_inline(el, style, &mut raw)?;
        Ok(finish(raw))
    }

    fn children_inline(&self, el: ElementRef<'_>, style: &RunStyle, out: &mut Vec<Inline>) -> Result<()> {
        for child in el.children() {
            match child.value() {
                Node::Text(t) => push_text(out, t, style),
                Node::Element(e) if !is_removed(e.name()) => {
                    if let Some(c) = ElementRef::wrap(child) {
                        self.inline(c, style, out)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn inline(&self, el: ElementRef<'_>, base: &RunStyle, out: &mut Vec<Inline>) -> Result<()> {
        let name = el.value().name();
        let css = self.css(el, base)?;
        let mut style = css.apply(base);

        match name {
            "br" => {
                out.push(Inline::LineBreak);
                return Ok(());
            }
            "img" => {
                let alt = el.value().attr("alt").unwrap_or("").trim();
                let label = if alt.is_empty() { "image" } else { alt };
                out.push(Inline::Text {
                    text: format!("[{label}]"),
                    style: RunStyle { italic: true, ..style },
                });
                return Ok(());
            }
            "b" | "strong" => style.bold = true,
            "i" | "em" | "cite" | "var" | "dfn" => style.italic = true,
            "u" | "ins" => style.underline = true,
            "code" | "kbd" | "samp" | "tt" => style.code = true,
            _ => {}
        }

        // Block content nested in an inline context (a <p> inside an <li> or
        // a <td>) starts on a new line.
        let block = is_block(name);
        if block && !ends_with_break(out) {
            out.push(Inline::LineBreak);
        }
        self.children_inline(el, &style, out)?;
        if block {
            out.push(Inline::LineBreak);
        }
        Ok(())
    }

    fn list(&self, el: ElementRef<'_>, style: &RunStyle) -> Result<List> {
        let mut list = List {
            ordered: el.value().name() == "ol",
            start: el
                .value()
                .attr("start")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(1),
            items: Vec::new(),
        };

        for child in el.children().filter_map(ElementRef::wrap) {
            match child.value().name() {
                "li" => list.items.push(self.item(child, style)?),
                // A list directly inside a list belongs to the previous item.
                "ul" | "ol" => {
                    let nested = Block::List(self.list(child, style)?);
                    match list.items.last_mut() {
                        Some(last) => last.children.push(nested),
                        None => list.items.push(ListItem {
                            content: Vec::new(),
                            children: vec![nested],
                        }),
                    }
                }
                _ => {}
            }
        }
        Ok(list)
    }

    /// Inline content up to the first nested block is the item text; the
    /// rest becomes child blocks.
    fn item(&self, li: ElementRef<'_>, base: &RunStyle) -> Result<ListItem> {
        let style = self.css(li, base)?.apply(base);
        let mut raw = Vec::new();
        let mut content = None;
        let mut children = Vec::new();
        for child in li.children() {
            match child.value() {
                Node::Text(t) => push_text(&mut raw, t, &style),
                Node::Element(e) if !is_removed(e.name()) => {
                    let Some(c) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if holds_blocks(c) {
                        match content {
                            None => content = Some(finish(std::mem::take(&mut raw))),
                            Some(_) => flush(&mut raw, &mut children),
                        }
                        self.block(c, &style, &mut children)?;
                    } else {
                        self.inline(c, &style, &mut raw)?;
                    }
                }
                _ => {}
            }
        }
        let content = match content {
            Some(content) => {
                flush(&mut raw, &mut children);
                content
            }
            None => finish(raw),
        };
        Ok(ListItem { content, children })
    }

    fn table(&self, el: ElementRef<'_>, style: &RunStyle, out: &mut Vec<Block>) -> Result<()> {
        let mut rows = Vec::new();
        let mut caption = Vec::new();
        let mut has_thead = false;

        for child in el.children().filter_map(ElementRef::wrap) {
            let name = child.value().name();
            self.css(child, style)?;
            match name {
                "caption" => caption = self.runs(child, style)?,
                "thead" | "tbody" | "tfoot" => {
                    has_thead |= name == "thead";
                    for tr in child.children().filter_map(ElementRef::wrap) {
                        if tr.value().name() == "tr" {
                            rows.push(self.row(tr, style, name == "thead")?);
                        }
                    }
                }
                "tr" => rows.push(self.row(child, style, false)?),
                _ => {}
            }
        }

        rows.retain(|r| !r.cells.is_empty());
        if rows.is_empty() {
            return Ok(());
        }

        // Without <thead>, leading rows made only of <th> are the header.
        if !has_thead {
            for row in rows.iter_mut() {
                if row.cells.iter().all(|c| c.header) {
                    row.header = true;
                } else {
                    break;
                }
            }
        }
        rows.sort_by_key(|r| !r.header);

        let columns = rows.iter().map(Row::width).max().unwrap_or(1).max(1);
        for row in rows.iter_mut() {
            let header = row.header;
            while row.width() < columns {
                row.cells.push(Cell {
                    content: Vec::new(),
                    colspan: 1,
                    header,
                });
            }
        }

        if !caption.is_empty() {
            out.push(Block::Paragraph {
                content: caption,
                align: Align::Center,
            });
        }
        out.push(Block::Table(Table { columns, rows }));
        Ok(())
    }

    fn row(&self, tr: ElementRef<'_>, base: &RunStyle, header: bool) -> Result<Row> {
        let style = self.css(tr, base)?.apply(base);
        let mut cells = Vec::new();
        for cell in tr.children().filter_map(ElementRef::wrap) {
            let name = cell.value().name();
            if name != "td" && name != "th" {
                continue;
            }
            let cell_style = self.css(cell, &style)?.apply(&style);
            let colspan = cell
                .value()
                .attr("colspan")
                .and_then(|s| s.trim().parse::<usize>().ok())
                .unwrap_or(1)
                .clamp(1, 64);
            let mut content = Vec::new();
            self.blocks(cell, &cell_style, &mut content)?;
            content.retain(|b| *b != Block::PageBreak);
            cells.push(Cell {
                content,
                colspan,
                header: header || name == "th",
            });
        }
        Ok(Row { header, cells })
    }

    fn css(&self, el: ElementRef<'_>, base: &RunStyle) -> Result<Css> {
        let mut css = Css {
            break_after: el
                .value()
                .attr("class")
                .is_some_and(|c| c.split_whitespace().any(|c| c.eq_ignore_ascii_case("page-break"))),
            ..Css::default()
        };
        let Some(style) = el.value().attr("style") else {
            return Ok(css);
        };
        let inherited = base.size_pt.unwrap_or(self.body_pt);

        for decl in style.split(';') {
            let Some((prop, value)) = decl.split_once(':') else {
                continue;
            };
            let prop = prop.trim().to_ascii_lowercase();
            let value = value.trim().trim_end_matches("!important").trim();
            let lower = value.to_ascii_lowercase();

            if is_unsupported(&prop, &lower) {
                return Err(UnsupportedStyle {
                    element: el.value().name().to_string(),
                    declaration: format!("{prop}: {value}"),
                });
            }

            match prop.as_str() {
                "font-weight" => {
                    css.bold = match lower.as_str() {
                        "bold" | "bolder" => Some(true),
                        "normal" | "lighter" => Some(false),
                        n => n.parse::<u32>().ok().map(|w| w >= 600),
                    }
                }
                "font-style" => css.italic = Some(lower == "italic" || lower == "oblique"),
                "text-decoration" | "text-decoration-line" => {
                    css.underline = lower.contains("underline")
                }
                "font-family" => {
                    css.family = value
                        .split(',')
                        .next()
                        .map(|f| f.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
                        .filter(|f| !f.is_empty())
                }
                "font-size" => css.size_pt = parse_size(&lower, inherited, self.body_pt),
                "text-align" => {
                    css.align = match lower.as_str() {
                        "center" => Some(Align::Center),
                        "right" | "end" => Some(Align::Right),
                        _ => Some(Align::Left),
                    }
                }
                "page-break-before" | "break-before" => css.break_before = is_page_break(&lower),
                "page-break-after" | "break-after" => css.break_after = is_page_break(&lower),
                _ => {}
            }
        }
        Ok(css)
    }
}

#[derive(Debug, Default)]
struct Css {
    bold: Option<bool>,
    italic: Option<bool>,
    underline: bool,
    family: Option<String>,
    size_pt: Option<f32>,
    align: Option<Align>,
    break_before: bool,
    break_after: bool,
}

impl Css {
    fn apply(&self, base: &RunStyle) -> RunStyle {
        let mut style = base.clone();
        if let Some(b) = self.bold {
            style.bold = b;
        }
        if let Some(i) = self.italic {
            style.italic = i;
        }
        style.underline |= self.underline;
        if self.family.is_some() {
            style.family = self.family.clone();
        }
        if self.size_pt.is_some() {
            style.size_pt = self.size_pt;
        }
        style
    }
}

fn is_unsupported(prop: &str, value: &str) -> bool {
    match prop {
        "position" => value == "absolute" || value == "fixed",
        "float" => value != "none",
        "display" => matches!(value, "flex" | "inline-flex" | "grid" | "inline-grid"),
        "transform" => value != "none",
        _ => false,
    }
}

fn is_page_break(value: &str) -> bool {
    matches!(value, "always" | "page" | "left" | "right")
}

/// `pt`, `px`, `em`, `rem` and `%` sizes, clamped to 4–96 pt.
fn parse_size(value: &str, inherited: f32, body: f32) -> Option<f32> {
    let num = |suffix: &str| value.strip_suffix(suffix)?.trim().parse::<f32>().ok();
    let pt = if let Some(n) = num("pt") {
        n
    } else if let Some(n) = num("px") {
        n * 0.75
    } else if let Some(n) = num("rem") {
        n * body
    } else if let Some(n) = num("em") {
        n * inherited
    } else if let Some(n) = num("%") {
        n / 100.0 * inherited
    } else {
        return None;
    };
    pt.is_finite().then(|| pt.clamp(4.0, 96.0))
}

// ── Run normalisation ────────────────────────────────────────────────────

fn push_text(out: &mut Vec<Inline>, raw: &str, style: &RunStyle) {
    let text = html::collapse_whitespace(raw);
    if text.is_empty() {
        return;
    }
    if let Some(Inline::Text { text: last, style: s }) = out.last_mut() {
        if s == style {
            last.push_str(&text);
            return;
        }
    }
    out.push(Inline::Text {
        text,
        style: style.clone(),
    });
}

fn ends_with_break(runs: &[Inline]) -> bool {
    matches!(runs.last(), None | Some(Inline::LineBreak))
}

/// Collapse spaces across run boundaries, trim every line, drop empty runs
/// and leading/trailing breaks.
fn finish(runs: Vec<Inline>) -> Vec<Inline> {
    let mut out: Vec<Inline> = Vec::with_capacity(runs.len());
    let mut after_space = true;
    for run in runs {
        match run {
            Inline::LineBreak => {
                trim_trailing(&mut out);
                // Consecutive breaks from nested blocks collapse into one.
                if !ends_with_break(&out) {
                    out.push(Inline::LineBreak);
                }
                after_space = true;
            }
            Inline::Text { text, style } => {
                let text = if after_space {
                    text.trim_start().to_string()
                } else {
                    text
                };
                if text.is_empty() {
                    continue;
                }
                after_space = text.ends_with(' ');
                match out.last_mut() {
                    Some(Inline::Text { text: t, style: s }) if *s == style => t.push_str(&text),
                    _ => out.push(Inline::Text { text, style }),
                }
            }
        }
    }
    trim_trailing(&mut out);
    while matches!(out.last(), Some(Inline::LineBreak)) {
        out.pop();
        trim_trailing(&mut out);
    }
    out
}

fn trim_trailing(out: &mut Vec<Inline>) {
    while let Some(Inline::Text { text, .. }) = out.last_mut() {
        let len = text.trim_end().len();
        text.truncate(len);
        if !text.is_empty() {
            break;
        }
        out.pop();
    }
}

fn flush(pending: &mut Vec<Inline>, out: &mut Vec<Block>) {
    let content = finish(std::mem::take(pending));
    if !content.is_empty() {
        out.push(Block::Paragraph {
            content,
            align: Align::Left,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lay(html: &str) -> Layout {
        layout(html, 12.0).unwrap()
    }

    fn text_of(block: &Block) -> String {
        match block {
            Block::Heading { content, .. } | Block::Paragraph { content, .. } => plain_text(content),
            other => panic!("not a text block: {other:?}"),
        }
    }

    #[test]
    fn headings_and_paragraphs() {
        let l = lay("<h1>Title</h1><p>Hello   <b>bold</b> world</p>");
        assert_eq!(l.blocks.len(), 2);
        assert!(matches!(l.blocks[0], Block::Heading { level: 1, .. }));
        assert_eq!(text_of(&l.blocks[1]), "Hello bold world");
        let Block::Paragraph { content, .. } = &l.blocks[1] else { unreachable!() };
        assert!(content.iter().any(|r| matches!(r, Inline::Text { text, style } if text == "bold" && style.bold)));
    }

    #[test]
    fn loose_text_becomes_a_paragraph() {
        let l = lay("<div>loose <i>text</i><p>para</p></div>");
        assert_eq!(l.blocks.len(), 2);
        assert_eq!(text_of(&l.blocks[0]), "loose text");
    }

    #[test]
    fn line_breaks_are_kept() {
        let l = lay("<p>one<br>two</p>");
        assert_eq!(text_of(&l.blocks[0]), "one\ntwo");
    }

    #[test]
    fn thead_rows_are_header_rows() {
        let l = lay(
            "<table><thead><tr><th>A</th><th>B</th></tr></thead>\
             <tbody><tr><td>1</td><td>2</td></tr><tr><td>3</td></tr></tbody></table>",
        );
        let t = l.tables().next().unwrap();
        assert_eq!(t.columns, 2);
        assert_eq!(t.header_rows(), 1);
        assert!(t.rows.iter().all(|r| r.cells.len() == 2), "short rows are padded");
    }

    #[test]
    fn leading_th_rows_are_header_rows() {
        let l = lay("<table><tr><th>A</th></tr><tr><td>1</td></tr><tr><th>x</th></tr></table>");
        let t = l.tables().next().unwrap();
        assert_eq!(t.header_rows(), 1);
        assert!(!t.rows[2].header);
    }

    #[test]
    fn colspan_counts_toward_width() {
        let l = lay("<table><tr><td colspan=\"2\">wide</td></tr><tr><td>a</td><td>b</td><td>c</td></tr></table>");
        let t = l.tables().next().unwrap();
        assert_eq!(t.columns, 3);
        assert_eq!(t.rows[0].cells.len(), 2);
        assert_eq!(t.rows[0].width(), 3);
    }

    #[test]
    fn nested_lists() {
        let l = lay("<ol start=\"3\"><li>one<ul><li>inner</li></ul></li><li>two</li></ol>");
        let Block::List(list) = &l.blocks[0] else { panic!() };
        assert!(list.ordered);
        assert_eq!(list.start, 3);
        assert_eq!(list.items.len(), 2);
        assert_eq!(plain_text(&list.items[0].content), "one");
        let Block::List(inner) = &list.items[0].children[0] else { panic!() };
        assert_eq!(inner.items.len(), 1);
    }

    #[test]
    fn pre_keeps_whitespace() {
        let l = lay("<pre>\nfn main() {\n    x();\n}\n</pre>");
        assert_eq!(l.blocks, vec![Block::Code("fn main() {\n    x();\n}".into())]);
    }

    #[test]
    fn inline_css_styles_runs() {
        let l = lay("<p><span style=\"font-weight: 700; font-size: 16px; font-family: 'Georgia', serif\">x</span></p>");
        let Block::Paragraph { content, .. } = &l.blocks[0] else { panic!() };
        let Inline::Text { style, .. } = &content[0] else { panic!() };
        assert!(style.bold);
        assert_eq!(style.size_pt, Some(12.0));
        assert_eq!(style.family.as_deref(), Some("Georgia"));
    }

    #[test]
    fn em_sizes_resolve_against_parent() {
        let l = lay("<div style=\"font-size: 20pt\"><p style=\"font-size: 0.5em\">x</p></div>");
        let Block::Paragraph { content, .. } = &l.blocks[0] else { panic!() };
        let Inline::Text { style, .. } = &content[0] else { panic!() };
        assert_eq!(style.size_pt, Some(10.0));
    }

    #[test]
    fn page_breaks() {
        let l = lay("<p>a</p><div style=\"page-break-after: always\"></div><p>b</p>");
        assert!(l.blocks.contains(&Block::PageBreak));
    }

    #[test]
    fn page_break_class_breaks_after() {
        let l = lay("<p>a</p><div class=\"note page-break\"></div><p>b</p>");
        assert_eq!(l.blocks[1], Block::PageBreak);
        assert_eq!(l.blocks.len(), 3);
    }

    #[test]
    fn unsupported_css_is_rejected() {
        for css in ["position: absolute", "float: left", "display: flex", "display:grid", "transform: rotate(3deg)"] {
            let html = format!("<div style=\"{css}\">x</div>");
            let err = layout(&html, 12.0).unwrap_err();
            assert_eq!(err.element, "div");
        }
        assert!(layout("<div style=\"float: none; position: relative\">x</div>", 12.0).is_ok());
    }

    #[test]
    fn images_become_placeholders() {
        let l = lay("<p><img src=\"x.png\" alt=\"Chart\"></p>");
        assert_eq!(text_of(&l.blocks[0]), "[Chart]");
    }

    #[test]
    fn blockquote_keeps_its_blocks() {
        let l = lay("<blockquote><p>a</p><ul><li>b</li></ul></blockquote>");
        let Block::Quote(inner) = &l.blocks[0] else { panic!() };
        assert_eq!(inner.len(), 2);
        assert!(matches!(inner[1], Block::List(_)));
    }

    const INNER: &str = "<table><tr><th>k</th><th>v</th></tr><tr><td>a</td><td>1</td></tr></table>";

    #[test]
    fn table_in_blockquote_stays_a_table() {
        let l = lay(&format!("<blockquote><p>Note</p>{INNER}</blockquote>"));
        let Block::Quote(inner) = &l.blocks[0] else { panic!() };
        assert!(matches!(inner[1], Block::Table(_)));
        assert_eq!(l.tables().count(), 1);
    }

    #[test]
    fn table_in_list_item_is_a_child_block() {
        let l = lay(&format!("<ul><li>Limits {INNER} apply</li><li>next</li></ul>"));
        let Block::List(list) = &l.blocks[0] else { panic!() };
        let item = &list.items[0];
        assert_eq!(plain_text(&item.content), "Limits");
        assert!(matches!(item.children[0], Block::Table(_)));
        assert_eq!(text_of(&item.children[1]), "apply");
        assert_eq!(l.tables().next().unwrap().header_rows(), 1);
    }

    #[test]
    fn table_in_cell_stays_a_table() {
        let l = lay(&format!("<table><tr><td>outer {INNER}</td><td>x</td></tr></table>"));
        let tables: Vec<&Table> = l.tables().collect();
        assert_eq!(tables.len(), 2);
        let cell = &tables[0].rows[0].cells[0];
        assert_eq!(text_of(&cell.content[0]), "outer");
        assert!(matches!(cell.content[1], Block::Table(_)));
        assert_eq!(tables[1].rows.len(), 2);
    }

    #[test]
    fn scripts_are_ignored() {
        let l = lay("<p>x</p><script>alert(1)</script>");
        assert_eq!(l.blocks.len(), 1);
    }
}
