//! PDF renderer: [`Layout`] → tagged PDF bytes via `lopdf`.
//!
//! ## Output
//!
//! * A4 pages, margins and sizes from the shared [`StyleSheet`].
//! * The twelve standard Type 1 fonts (Helvetica, Times, Courier and their
//!   bold/oblique variants) with `WinAnsiEncoding`. No font files are
//!   embedded, so text is limited to the WinAnsi repertoire; anything else
//!   fails this render.
//! * A structure tree (`Document`, `H1`–`H6`, `P`, `L`/`LI`/`Lbl`/`LBody`,
//!   `Table`/`TR`/`TH`/`TD`, `Code`, `BlockQuote`) linked to marked content,
//!   so tables are real table structures for assistive technology and
//!   extraction tools.
//! * Table header rows are repeated at the top of every page a table spans.
//!   The repeats are marked as artifacts, so the structure tree still holds
//!   each header row once.
//!
//! Text width is estimated from an average advance per font class, which is
//! enough for wrapping and alignment without font metrics.

use crate::error::{DocRegenError, ExportFormat};
use crate::export::layout::{Align, Block, Inline, Layout, List, RunStyle, Table};
use crate::export::style::{FontClass, StyleSheet, PAGE_HEIGHT_PT, PAGE_WIDTH_PT};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::ops::Range;
use tracing::debug;

type Result<T> = std::result::Result<T, DocRegenError>;

fn fail(detail: impl Into<String>) -> DocRegenError {
    DocRegenError::render(ExportFormat::Pdf, detail)
}

/// Render `layout` to PDF bytes.
pub fn render_pdf(layout: &Layout, style: &StyleSheet, title: Option<&str>) -> Result<Vec<u8>> {
    let mut writer = PdfWriter::new(style);
    for block in &layout.blocks {
        writer.block(block, 0)?;
    }
    debug!(
        "PDF layout: {} pages, {} structure elements",
        writer.pages.len(),
        writer.elems.len()
    );
    writer.finish(title)
}

// ── Fonts ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Font {
    class: FontClass,
    bold: bool,
    italic: bool,
}

const CLASSES: [FontClass; 3] = [FontClass::Sans, FontClass::Serif, FontClass::Mono];

impl Font {
    fn all() -> impl Iterator<Item = Font> {
        CLASSES.into_iter().flat_map(|class| {
            [(false, false), (true, false), (false, true), (true, true)]
                .into_iter()
                .map(move |(bold, italic)| Font { class, bold, italic })
        })
    }

    /// Resource name, e.g. `FS0` for Helvetica, `FM3` for Courier-BoldOblique.
    fn resource(self) -> String {
        let class = match self.class {
            FontClass::Sans => 'S',
            FontClass::Serif => 'R',
            FontClass::Mono => 'M',
        };
        format!("F{}{}", class, self.bold as u8 + 2 * self.italic as u8)
    }

    fn base_name(self) -> &'static str {
        match (self.class, self.bold, self.italic) {
            (FontClass::Sans, false, false) => "Helvetica",
            (FontClass::Sans, true, false) => "Helvetica-Bold",
            (FontClass::Sans, false, true) => "Helvetica-Oblique",
            (FontClass::Sans, true, true) => "Helvetica-BoldOblique",
            (FontClass::Serif, false, false) => "Times-Roman",
            (FontClass::Serif, true, false) => "Times-Bold",
            (FontClass::Serif, false, true) => "Times-Italic",
            (FontClass::Serif, true, true) => "Times-BoldItalic",
            (FontClass::Mono, false, false) => "Courier",
            (FontClass::Mono, true, false) => "Courier-Bold",
            (FontClass::Mono, false, true) => "Courier-Oblique",
            (FontClass::Mono, true, true) => "Courier-BoldOblique",
        }
    }

    fn width(self, text: &str, size: f32) -> f32 {
        let bold = if self.bold && self.class != FontClass::Mono { 1.05 } else { 1.0 };
        text.chars().count() as f32 * size * self.class.avg_advance() * bold
    }
}

fn win_ansi_byte(c: char) -> Option<u8> {
    let b = match c {
        ' '..='~' | '\u{A0}'..='\u{FF}' => c as u8,
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8A,
        '‹' => 0x8B,
        'Œ' => 0x8C,
        'Ž' => 0x8E,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9A,
        '›' => 0x9B,
        'œ' => 0x9C,
        'ž' => 0x9E,
        'Ÿ' => 0x9F,
        _ => return None,
    };
    Some(b)
}

/// Encode `text` for a standard font.
pub fn encode_win_ansi(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|c| {
            win_ansi_byte(c).ok_or_else(|| {
                fail(format!(
                    "character '{c}' (U+{:04X}) cannot be encoded with the standard PDF fonts",
                    c as u32
                ))
            })
        })
        .collect()
}

/// Text string for document metadata: PDFDocEncoding-compatible ASCII as a
/// literal, anything else as UTF-16BE with a byte order mark.
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        Object::string_literal(s)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        bytes.extend(s.encode_utf16().flat_map(|u| u.to_be_bytes()));
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

fn real(v: f32) -> Object {
    v.into()
}

fn name(n: &str) -> Object {
    Object::Name(n.as_bytes().to_vec())
}

fn align_offset(align: Align, avail: f32, width: f32) -> f32 {
    match align {
        Align::Left => 0.0,
        Align::Center => ((avail - width) / 2.0).max(0.0),
        Align::Right => (avail - width).max(0.0),
    }
}

// ── Line breaking ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Seg {
    font: Font,
    size: f32,
    underline: bool,
    text: String,
}

#[derive(Debug, Clone, Default)]
struct Line {
    segs: Vec<Seg>,
    /// Largest font size on the line.
    size: f32,
}

impl Line {
    fn width(&self) -> f32 {
        self.segs.iter().map(|s| s.font.width(&s.text, s.size)).sum()
    }

    fn push(&mut self, font: Font, size: f32, underline: bool, text: &str) {
        self.size = self.size.max(size);
        if let Some(last) = self.segs.last_mut() {
            if last.font == font && last.size == size && last.underline == underline {
                last.text.push_str(text);
                return;
            }
        }
        self.segs.push(Seg {
            font,
            size,
            underline,
            text: text.to_string(),
        });
    }

    fn trim_end(&mut self) {
        while let Some(last) = self.segs.last_mut() {
            let len = last.text.trim_end_matches(' ').len();
            last.text.truncate(len);
            if !last.text.is_empty() {
                break;
            }
            self.segs.pop();
        }
    }
}

/// Block-level font and size that runs inherit.
#[derive(Debug, Clone, Copy)]
struct Base {
    font: Font,
    size: f32,
}

// ── Page model ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Page {
    ops: Vec<Operation>,
    /// Structure element owning each MCID on this page.
    mcids: Vec<usize>,
}

#[derive(Debug)]
enum Kid {
    Elem(usize),
    Mcid { page: usize, mcid: usize },
}

#[derive(Debug)]
struct Elem {
    tag: String,
    parent: Option<usize>,
    kids: Vec<Kid>,
    attrs: Option<Dictionary>,
}

// ── Table model ──────────────────────────────────────────────────────────

/// Horizontal slice of a cell's content box.
#[derive(Debug, Clone, Copy)]
struct Area {
    dx: f32,
    width: f32,
}

impl Area {
    fn inset(self, by: f32) -> Area {
        let by = by.min(self.width / 2.0);
        Area {
            dx: self.dx + by,
            width: self.width - by,
        }
    }
}

/// Cell content measured for the cell's width. A row continued on the next
/// page breaks between pieces, never inside one.
#[derive(Debug)]
enum Piece {
    Line {
        line: Line,
        /// Offset from the cell's content box, alignment included.
        dx: f32,
        elem: usize,
        label: Option<Label>,
    },
    /// One row of a nested table.
    Row { row: GridRow, dx: f32 },
}

#[derive(Debug)]
struct Label {
    line: Line,
    dx: f32,
    elem: usize,
}

impl Piece {
    fn height(&self, style: &StyleSheet) -> f32 {
        match self {
            Piece::Line { line, .. } => line.size * style.line_height,
            Piece::Row { row, .. } => row.height,
        }
    }
}

/// A table row with every cell measured.
#[derive(Debug)]
struct GridRow {
    cells: Vec<GridCell>,
    /// Height when drawn in one piece.
    height: f32,
}

#[derive(Debug)]
struct GridCell {
    /// Offset from the table's left edge.
    dx: f32,
    width: f32,
    header: bool,
    pieces: Vec<Piece>,
}

/// Baseline of a line box `lh` tall whose top is at `top`.
fn baseline(top: f32, lh: f32, size: f32) -> f32 {
    top - lh + (lh - size) / 2.0 + size * 0.2
}

struct PdfWriter<'a> {
    style: &'a StyleSheet,
    body: Font,
    pages: Vec<Page>,
    elems: Vec<Elem>,
    /// Top of the next line box.
    y: f32,
    /// Left indent of quotations and list item content.
    indent: f32,
}

impl<'a> PdfWriter<'a> {
    fn new(style: &'a StyleSheet) -> Self {
        let mut w = Self {
            style,
            body: Font {
                class: FontClass::of(&style.font_family),
                bold: false,
                italic: false,
            },
            pages: vec![Page::default()],
            elems: Vec::new(),
            y: 0.0,
            indent: 0.0,
        };
        w.y = w.top();
        w.elems.push(Elem {
            tag: "Document".into(),
            parent: None,
            kids: Vec::new(),
            attrs: None,
        });
        w
    }

    fn top(&self) -> f32 {
        PAGE_HEIGHT_PT - self.style.margin_pt()
    }

    fn bottom(&self) -> f32 {
        self.style.margin_pt()
    }

    fn left(&self) -> f32 {
        self.style.margin_pt() + self.indent
    }

    fn width(&self) -> f32 {
        (self.style.content_width_pt() - self.indent).max(1.0)
    }

    fn at_top(&self) -> bool {
        (self.y - self.top()).abs() < 0.01
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.y = self.top();
    }

    /// Break the page unless `height` still fits.
    fn ensure(&mut self, height: f32) {
        if self.y - height < self.bottom() && !self.at_top() {
            self.new_page();
        }
    }

    fn space(&mut self, pt: f32) {
        if self.at_top() {
            return;
        }
        self.y -= pt;
        if self.y < self.bottom() {
            self.new_page();
        }
    }

    fn page(&mut self) -> &mut Page {
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn open(&mut self, tag: impl Into<String>, parent: usize) -> usize {
        let id = self.elems.len();
        self.elems.push(Elem {
            tag: tag.into(),
            parent: Some(parent),
            kids: Vec::new(),
            attrs: None,
        });
        self.elems[parent].kids.push(Kid::Elem(id));
        id
    }

    /// Append `ops` as a marked-content sequence owned by `elem`, or as an
    /// artifact when `elem` is `None`.
    fn mark(&mut self, elem: Option<usize>, ops: Vec<Operation>) {
        let page_no = self.pages.len() - 1;
        match elem {
            Some(elem) => {
                let tag = self.elems[elem].tag.clone();
                let page = self.page();
                let mcid = page.mcids.len();
                page.mcids.push(elem);
                page.ops.push(Operation::new(
                    "BDC",
                    vec![name(&tag), Object::Dictionary(dictionary! { "MCID" => mcid as i64 })],
                ));
                page.ops.extend(ops);
                page.ops.push(Operation::new("EMC", vec![]));
                self.elems[elem].kids.push(Kid::Mcid { page: page_no, mcid });
            }
            None => {
                let page = self.page();
                page.ops.push(Operation::new("BMC", vec![name("Artifact")]));
                page.ops.extend(ops);
                page.ops.push(Operation::new("EMC", vec![]));
            }
        }
    }

    // ── Text ─────────────────────────────────────────────────────────────

    fn run_font(&self, base: Base, run: &RunStyle) -> (Font, f32) {
        let class = if run.code || run.family.is_some() {
            FontClass::of(self.style.run_family(run))
        } else {
            base.font.class
        };
        let font = Font {
            class,
            bold: base.font.bold || run.bold,
            italic: base.font.italic || run.italic,
        };
        (font, self.style.run_size(base.size, run))
    }

    /// Greedy line breaking at spaces; words wider than a line are split.
    /// Always returns at least one line.
    fn wrap(&self, runs: &[Inline], base: Base, max_width: f32) -> Vec<Line> {
        let mut lines = Vec::new();
        let mut line = Line {
            size: base.size,
            ..Line::default()
        };
        let mut width = 0.0f32;

        for run in runs {
            let (text, run_style) = match run {
                Inline::LineBreak => {
                    line.trim_end();
                    lines.push(std::mem::replace(
                        &mut line,
                        Line {
                            size: base.size,
                            ..Line::default()
                        },
                    ));
                    width = 0.0;
                    continue;
                }
                Inline::Text { text, style } => (text, style),
            };
            let (font, size) = self.run_font(base, run_style);

            for word in text.split_inclusive(' ') {
                let visible = font.width(word.trim_end_matches(' '), size);
                if width + visible > max_width && !line.segs.is_empty() {
                    line.trim_end();
                    lines.push(std::mem::take(&mut line));
                    width = 0.0;
                }
                if line.segs.is_empty() && visible > max_width {
                    // Hard-split an over-long word.
                    let mut chunk = String::new();
                    for c in word.chars() {
                        let mut candidate = chunk.clone();
                        candidate.push(c);
                        if font.width(&candidate, size) > max_width && !chunk.is_empty() {
                            let mut full = Line::default();
                            full.push(font, size, run_style.underline, &chunk);
                            lines.push(full);
                            chunk.clear();
                        }
                        chunk.push(c);
                    }
                    line.push(font, size, run_style.underline, &chunk);
                    width = font.width(&chunk, size);
                    continue;
                }
                line.push(font, size, run_style.underline, word);
                width += font.width(word, size);
            }
        }

        line.trim_end();
        if !line.segs.is_empty() || lines.is_empty() {
            if line.size == 0.0 {
                line.size = base.size;
            }
            lines.push(line);
        }
        lines
    }

    fn line_height(&self, line: &Line) -> f32 {
        line.size * self.style.line_height
    }

    /// Operators drawing `line` with its baseline at (`x`, `baseline`).
    fn text_ops(&self, line: &Line, x: f32, baseline: f32) -> Result<Vec<Operation>> {
        let (r, g, b) = self.style.text_color.unit();
        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("rg", vec![real(r), real(g), real(b)]),
            Operation::new(
                "Tm",
                vec![
                    Object::Integer(1),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(1),
                    real(x),
                    real(baseline),
                ],
            ),
        ];
        for seg in &line.segs {
            ops.push(Operation::new(
                "Tf",
                vec![name(&seg.font.resource()), real(seg.size)],
            ));
            ops.push(Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(&seg.text)?, StringFormat::Hexadecimal)],
            ));
        }
        ops.push(Operation::new("ET", vec![]));

        // Underlines as thin filled rectangles below the baseline.
        let mut cursor = x;
        for seg in &line.segs {
            let w = seg.font.width(&seg.text, seg.size);
            if seg.underline {
                ops.push(Operation::new(
                    "re",
                    vec![
                        real(cursor),
                        real(baseline - seg.size * 0.15),
                        real(w),
                        real((seg.size * 0.05).max(0.5)),
                    ],
                ));
                ops.push(Operation::new("f", vec![]));
            }
            cursor += w;
        }
        Ok(ops)
    }

    /// Draw `lines` for `elem` starting at the cursor; one marked-content
    /// sequence per line so paragraphs can cross page breaks.
    fn lines(
        &mut self,
        elem: Option<usize>,
        lines: &[Line],
        x: f32,
        avail: f32,
        align: Align,
        mut label: Option<(usize, Line, f32)>,
    ) -> Result<()> {
        for line in lines {
            let lh = self.line_height(line);
            self.ensure(lh);
            let base = baseline(self.y, lh, line.size);
            let offset = align_offset(align, avail, line.width());
            if let Some((lbl, label_line, lx)) = label.take() {
                let ops = self.text_ops(&label_line, lx, base)?;
                self.mark(Some(lbl), ops);
            }
            if !line.segs.is_empty() {
                let ops = self.text_ops(line, x + offset, base)?;
                self.mark(elem, ops);
            }
            self.y -= lh;
        }
        Ok(())
    }

    // ── Blocks ───────────────────────────────────────────────────────────

    fn block(&mut self, block: &Block, parent: usize) -> Result<()> {
        let style = self.style;
        match block {
            Block::Heading {
                level,
                content,
                align,
            } => {
                self.space(style.heading_space_before(*level));
                let elem = self.open(format!("H{}", (*level).clamp(1, 6)), parent);
                let base = self.heading_base(*level);
                let lines = self.wrap(content, base, self.width());
                // Keep a heading with at least its first following line.
                let needed: f32 = lines.iter().map(|l| self.line_height(l)).sum::<f32>()
                    + style.font_size_pt * style.line_height;
                self.ensure(needed);
                self.lines(Some(elem), &lines, self.left(), self.width(), *align, None)?;
                self.space(style.paragraph_spacing_pt);
            }
            Block::Paragraph { content, align } => {
                let elem = self.open("P", parent);
                let lines = self.wrap(content, self.body_base(), self.width());
                self.lines(Some(elem), &lines, self.left(), self.width(), *align, None)?;
                self.space(style.paragraph_spacing_pt);
            }
            Block::List(list) => {
                self.list(list, parent, 0)?;
                self.space(style.paragraph_spacing_pt);
            }
            Block::Table(table) => {
                self.table(table, parent)?;
                self.space(style.paragraph_spacing_pt);
            }
            Block::Code(text) => {
                let elem = self.open("Code", parent);
                for source_line in text.split('\n') {
                    let runs = [Inline::Text {
                        text: source_line.to_string(),
                        style: RunStyle::default(),
                    }];
                    let lines = self.wrap(&runs, self.code_base(), self.width());
                    self.lines(Some(elem), &lines, self.left(), self.width(), Align::Left, None)?;
                }
                self.space(style.paragraph_spacing_pt);
            }
            Block::Quote(blocks) => {
                let quote = self.open("BlockQuote", parent);
                let indent = style.list_indent_pt;
                self.indent += indent;
                for inner in blocks {
                    self.block(inner, quote)?;
                }
                self.indent -= indent;
            }
            Block::Rule => {
                let h = style.paragraph_spacing_pt * 2.0;
                self.ensure(h);
                let mid = self.y - h / 2.0;
                let (r, g, b) = style.table_border_color.unit();
                let ops = vec![
                    Operation::new("rg", vec![real(r), real(g), real(b)]),
                    Operation::new(
                        "re",
                        vec![
                            real(self.left()),
                            real(mid),
                            real(self.width()),
                            real(style.table_border_pt.max(0.5)),
                        ],
                    ),
                    Operation::new("f", vec![]),
                ];
                self.mark(None, ops);
                self.y -= h;
            }
            Block::PageBreak => {
                if !self.at_top() {
                    self.new_page();
                }
            }
        }
        Ok(())
    }

    fn body_base(&self) -> Base {
        Base {
            font: self.body,
            size: self.style.font_size_pt,
        }
    }

    fn heading_base(&self, level: u8) -> Base {
        Base {
            font: Font {
                bold: true,
                ..self.body
            },
            size: self.style.heading_size(level),
        }
    }

    fn code_base(&self) -> Base {
        Base {
            font: Font {
                class: FontClass::of(&self.style.code_font_family),
                bold: false,
                italic: false,
            },
            size: self.style.code_font_size(),
        }
    }

    fn list(&mut self, list: &List, parent: usize, depth: usize) -> Result<()> {
        let l = self.open("L", parent);
        let indent = self.style.list_indent(depth);
        let text_x = self.left() + indent;
        let label_x = text_x - self.style.list_indent_pt;
        let avail = self.width() - indent;

        for (i, item) in list.items.iter().enumerate() {
            let li = self.open("LI", l);
            let lbl = self.open("Lbl", li);
            let body = self.open("LBody", li);

            let mut label_line = Line::default();
            label_line.push(self.body, self.style.font_size_pt, false, &list.label(i, depth));

            let lines = self.wrap(&item.content, self.body_base(), avail);
            self.lines(
                Some(body),
                &lines,
                text_x,
                avail,
                Align::Left,
                Some((lbl, label_line, label_x)),
            )?;
            for child in &item.children {
                match child {
                    Block::List(nested) => self.list(nested, body, depth + 1)?,
                    other => {
                        self.indent += indent;
                        self.block(other, body)?;
                        self.indent -= indent;
                    }
                }
            }
        }
        Ok(())
    }

    // ── Tables ───────────────────────────────────────────────────────────

    fn table(&mut self, table: &Table, parent: usize) -> Result<()> {
        let rows = self.grid(table, self.width(), parent);
        let header_rows = table.header_rows().min(rows.len());
        let header_height: f32 = rows[..header_rows].iter().map(|r| r.height).sum();
        // Header rows taking half a page are not repeated.
        let repeat = header_height < (self.top() - self.bottom()) / 2.0;

        for (ri, row) in rows.iter().enumerate() {
            let repeats = if repeat && ri >= header_rows {
                &rows[..header_rows]
            } else {
                &rows[..0]
            };
            self.flow_row(row, repeats)?;
        }
        Ok(())
    }

    /// Create the structure elements of `table` under `parent` and measure
    /// its rows for a table `width` wide.
    fn grid(&mut self, table: &Table, width: f32, parent: usize) -> Vec<GridRow> {
        let style = self.style;
        let pad = style.cell_padding_pt;
        let col_w = width / table.columns.max(1) as f32;
        let t = self.open("Table", parent);

        let mut rows = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let tr = self.open("TR", t);
            let mut cells = Vec::with_capacity(row.cells.len());
            let mut dx = 0.0;
            for cell in &row.cells {
                let w = col_w * cell.colspan as f32;
                let td = self.open(if cell.header { "TH" } else { "TD" }, tr);
                let mut attrs = Dictionary::new();
                attrs.set("O", name("Table"));
                if cell.header {
                    attrs.set("Scope", name("Column"));
                }
                if cell.colspan > 1 {
                    attrs.set("ColSpan", cell.colspan as i64);
                }
                self.elems[td].attrs = Some(attrs);

                let area = Area {
                    dx: 0.0,
                    width: (w - 2.0 * pad).max(1.0),
                };
                let mut pieces = Vec::new();
                self.pieces(&cell.content, area, td, cell.header, &mut pieces);
                cells.push(GridCell {
                    dx,
                    width: w,
                    header: cell.header,
                    pieces,
                });
                dx += w;
            }
            let min = style.font_size_pt * style.line_height;
            let content = cells
                .iter()
                .map(|c| c.pieces.iter().map(|p| p.height(style)).sum::<f32>())
                .fold(min, f32::max);
            rows.push(GridRow {
                cells,
                height: content + 2.0 * pad,
            });
        }
        rows
    }

    /// Measure `blocks` into cell pieces placed in `area`.
    fn pieces(&mut self, blocks: &[Block], area: Area, parent: usize, bold: bool, out: &mut Vec<Piece>) {
        let style = self.style;
        for block in blocks {
            match block {
                Block::Heading {
                    level,
                    content,
                    align,
                } => {
                    let elem = self.open(format!("H{}", (*level).clamp(1, 6)), parent);
                    let base = self.heading_base(*level);
                    self.line_pieces(content, base, area, *align, elem, out);
                }
                Block::Paragraph { content, align } => {
                    let elem = self.open("P", parent);
                    let base = Base {
                        font: Font { bold, ..self.body },
                        size: style.font_size_pt,
                    };
                    self.line_pieces(content, base, area, *align, elem, out);
                }
                Block::List(list) => self.list_pieces(list, area, parent, 0, bold, out),
                Block::Table(table) => {
                    for row in self.grid(table, area.width, parent) {
                        out.push(Piece::Row { row, dx: area.dx });
                    }
                }
                Block::Code(text) => {
                    let elem = self.open("Code", parent);
                    for source_line in text.split('\n') {
                        let runs = [Inline::Text {
                            text: source_line.to_string(),
                            style: RunStyle::default(),
                        }];
                        self.line_pieces(&runs, self.code_base(), area, Align::Left, elem, out);
                    }
                }
                Block::Quote(inner) => {
                    let quote = self.open("BlockQuote", parent);
                    self.pieces(inner, area.inset(style.list_indent_pt), quote, bold, out);
                }
                Block::Rule | Block::PageBreak => {}
            }
        }
    }

    fn line_pieces(
        &self,
        runs: &[Inline],
        base: Base,
        area: Area,
        align: Align,
        elem: usize,
        out: &mut Vec<Piece>,
    ) {
        for line in self.wrap(runs, base, area.width) {
            let dx = area.dx + align_offset(align, area.width, line.width());
            out.push(Piece::Line {
                line,
                dx,
                elem,
                label: None,
            });
        }
    }

    fn list_pieces(
        &mut self,
        list: &List,
        area: Area,
        parent: usize,
        depth: usize,
        bold: bool,
        out: &mut Vec<Piece>,
    ) {
        let style = self.style;
        let l = self.open("L", parent);
        let inner = area.inset(style.list_indent_pt);
        let base = Base {
            font: Font { bold, ..self.body },
            size: style.font_size_pt,
        };

        for (i, item) in list.items.iter().enumerate() {
            let li = self.open("LI", l);
            let lbl = self.open("Lbl", li);
            let body = self.open("LBody", li);

            let mut label = Line::default();
            label.push(base.font, base.size, false, &list.label(i, depth));
            let first = out.len();
            self.line_pieces(&item.content, base, inner, Align::Left, body, out);
            if let Some(Piece::Line { label: slot, .. }) = out.get_mut(first) {
                *slot = Some(Label {
                    line: label,
                    dx: area.dx,
                    elem: lbl,
                });
            }

            for child in &item.children {
                match child {
                    Block::List(nested) => self.list_pieces(nested, inner, body, depth + 1, bold, out),
                    other => self.pieces(std::slice::from_ref(other), inner, body, bold, out),
                }
            }
        }
    }

    /// Draw `row` at the cursor. A row taller than the space left continues
    /// on the next page; `repeats` are drawn as artifacts at the top of every
    /// new page the row moves to.
    fn flow_row(&mut self, row: &GridRow, repeats: &[GridRow]) -> Result<()> {
        let style = self.style;
        let pad = style.cell_padding_pt;
        let min = style.font_size_pt * style.line_height;
        let repeat_height: f32 = repeats.iter().map(|r| r.height).sum();

        // A row that fits on a fresh page moves there whole.
        let mut fresh = self.at_top();
        if !fresh
            && self.y - row.height < self.bottom()
            && row.height <= self.top() - self.bottom() - repeat_height
        {
            self.page_break_with(repeats)?;
            fresh = true;
        }

        let mut next = vec![0usize; row.cells.len()];
        loop {
            let room = self.y - self.bottom() - 2.0 * pad;
            let mut ranges = Vec::with_capacity(row.cells.len());
            let mut content = 0.0f32;
            for (cell, cursor) in row.cells.iter().zip(next.iter_mut()) {
                let from = *cursor;
                let mut used = 0.0f32;
                while let Some(piece) = cell.pieces.get(*cursor) {
                    let h = piece.height(style);
                    // On a fresh page every cell takes at least one piece.
                    if used + h > room && !(fresh && *cursor == from) {
                        break;
                    }
                    used += h;
                    *cursor += 1;
                }
                ranges.push(from..*cursor);
                content = content.max(used);
            }

            let done = row
                .cells
                .iter()
                .zip(&next)
                .all(|(cell, &n)| n >= cell.pieces.len());
            if done || ranges.iter().any(|r| !r.is_empty()) {
                let height = if done {
                    content.max(min) + 2.0 * pad
                } else {
                    (self.y - self.bottom()).max(content + 2.0 * pad)
                };
                let (left, top) = (self.left(), self.y);
                self.draw_row(row, &ranges, left, top, height, false)?;
                self.y -= height;
                if done {
                    return Ok(());
                }
            }
            self.page_break_with(repeats)?;
            fresh = true;
        }
    }

    fn page_break_with(&mut self, repeats: &[GridRow]) -> Result<()> {
        self.new_page();
        for row in repeats {
            let ranges: Vec<Range<usize>> = row.cells.iter().map(|c| 0..c.pieces.len()).collect();
            let (left, top) = (self.left(), self.y);
            self.draw_row(row, &ranges, left, top, row.height, true)?;
            self.y -= row.height;
        }
        Ok(())
    }

    /// Draw the cell frames of `row` as a band `height` tall at (`x`, `top`)
    /// and, per cell, the pieces in its range.
    fn draw_row(
        &mut self,
        row: &GridRow,
        ranges: &[Range<usize>],
        x: f32,
        top: f32,
        height: f32,
        artifact: bool,
    ) -> Result<()> {
        let pad = self.style.cell_padding_pt;
        for (cell, range) in row.cells.iter().zip(ranges) {
            let left = x + cell.dx;
            self.frame(left, top, cell.width, height, cell.header);
            let mut y = top - pad;
            for piece in &cell.pieces[range.clone()] {
                self.draw_piece(piece, left + pad, y, artifact)?;
                y -= piece.height(self.style);
            }
        }
        Ok(())
    }

    fn draw_piece(&mut self, piece: &Piece, x: f32, top: f32, artifact: bool) -> Result<()> {
        match piece {
            Piece::Line {
                line,
                dx,
                elem,
                label,
            } => {
                let base = baseline(top, self.line_height(line), line.size);
                if let Some(label) = label {
                    let ops = self.text_ops(&label.line, x + label.dx, base)?;
                    self.mark((!artifact).then_some(label.elem), ops);
                }
                if !line.segs.is_empty() {
                    let ops = self.text_ops(line, x + dx, base)?;
                    self.mark((!artifact).then_some(*elem), ops);
                }
            }
            Piece::Row { row, dx } => {
                let ranges: Vec<Range<usize>> = row.cells.iter().map(|c| 0..c.pieces.len()).collect();
                self.draw_row(row, &ranges, x + dx, top, row.height, artifact)?;
            }
        }
        Ok(())
    }

    /// Header fill and border of one cell, as an artifact.
    fn frame(&mut self, x: f32, top: f32, w: f32, h: f32, header: bool) {
        let style = self.style;
        let mut ops = Vec::new();
        if header {
            let (r, g, b) = style.table_header_fill.unit();
            ops.push(Operation::new("rg", vec![real(r), real(g), real(b)]));
            ops.push(Operation::new("re", vec![real(x), real(top - h), real(w), real(h)]));
            ops.push(Operation::new("f", vec![]));
        }
        if style.table_border_pt > 0.0 {
            let (r, g, b) = style.table_border_color.unit();
            ops.push(Operation::new("w", vec![real(style.table_border_pt)]));
            ops.push(Operation::new("RG", vec![real(r), real(g), real(b)]));
            ops.push(Operation::new("re", vec![real(x), real(top - h), real(w), real(h)]));
            ops.push(Operation::new("S", vec![]));
        }
        if !ops.is_empty() {
            self.mark(None, ops);
        }
    }

    // ── Serialisation ────────────────────────────────────────────────────

    fn finish(self, title: Option<&str>) -> Result<Vec<u8>> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let mut fonts = Dictionary::new();
        for font in Font::all() {
            let id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_name(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(font.resource(), id);
        }
        let resources_id = doc.add_object(dictionary! { "Font" => fonts });

        let tree_root_id = doc.new_object_id();
        let elem_ids: Vec<ObjectId> = self.elems.iter().map(|_| doc.new_object_id()).collect();

        let mut page_ids = Vec::with_capacity(self.pages.len());
        for (i, page) in self.pages.iter().enumerate() {
            let content = Content {
                operations: page.ops.clone(),
            }
            .encode()
            .map_err(|e| fail(format!("content stream: {e}")))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    real(PAGE_WIDTH_PT),
                    real(PAGE_HEIGHT_PT),
                ],
                "Contents" => content_id,
                "Resources" => resources_id,
                "StructParents" => i as i64,
                "Tabs" => "S",
            });
            page_ids.push(page_id);
        }

        for (elem, &id) in self.elems.iter().zip(&elem_ids) {
            let kids: Vec<Object> = elem
                .kids
                .iter()
                .map(|kid| match *kid {
                    Kid::Elem(e) => Object::Reference(elem_ids[e]),
                    Kid::Mcid { page, mcid } => Object::Dictionary(dictionary! {
                        "Type" => "MCR",
                        "Pg" => page_ids[page],
                        "MCID" => mcid as i64,
                    }),
                })
                .collect();
            let mut dict = dictionary! {
                "Type" => "StructElem",
                "S" => name(&elem.tag),
                "P" => elem.parent.map_or(tree_root_id, |p| elem_ids[p]),
                "K" => kids,
            };
            if let Some(attrs) = &elem.attrs {
                dict.set("A", attrs.clone());
            }
            doc.objects.insert(id, Object::Dictionary(dict));
        }

        let mut nums = Vec::with_capacity(self.pages.len() * 2);
        for (i, page) in self.pages.iter().enumerate() {
            nums.push(Object::Integer(i as i64));
            nums.push(Object::Array(
                page.mcids.iter().map(|&e| Object::Reference(elem_ids[e])).collect(),
            ));
        }
        doc.objects.insert(
            tree_root_id,
            Object::Dictionary(dictionary! {
                "Type" => "StructTreeRoot",
                "K" => elem_ids[0],
                "ParentTree" => dictionary! { "Nums" => nums },
                "ParentTreeNextKey" => self.pages.len() as i64,
            }),
        );

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => page_ids.iter().map(|&id| Object::Reference(id)).collect::<Vec<_>>(),
                "Count" => page_ids.len() as i64,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "StructTreeRoot" => tree_root_id,
            "MarkInfo" => dictionary! { "Marked" => true },
            "Lang" => Object::string_literal("en"),
            "ViewerPreferences" => dictionary! { "DisplayDocTitle" => true },
        });
        doc.trailer.set("Root", catalog_id);

        let mut info = dictionary! { "Producer" => Object::string_literal("edgequake-docregen") };
        if let Some(title) = title {
            info.set("Title", text_string(title));
        }
        let info_id = doc.add_object(info);
        doc.trailer.set("Info", info_id);

        doc.compress();
        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| fail(format!("serialisation: {e}")))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::layout::layout;

    fn render(html: &str) -> Result<Vec<u8>> {
        let style = StyleSheet::default();
        render_pdf(&layout(html, style.font_size_pt).unwrap(), &style, Some("T"))
    }

    fn tags(bytes: &[u8]) -> Vec<String> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.objects
            .values()
            .filter_map(|o| o.as_dict().ok())
            .filter(|d| d.get(b"Type").and_then(|t| t.as_name()).ok() == Some(b"StructElem".as_slice()))
            .filter_map(|d| d.get(b"S").and_then(|s| s.as_name()).ok())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect()
    }

    #[test]
    fn produces_a_loadable_pdf() {
        let bytes = render("<h1>Title</h1><p>Hello world</p>").unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn structure_tree_has_semantic_tags() {
        let bytes = render("<h2>A</h2><p>x</p><ul><li>i</li></ul><table><tr><th>h</th></tr><tr><td>d</td></tr></table>").unwrap();
        let tags = tags(&bytes);
        for t in ["Document", "H2", "P", "L", "LI", "Table", "TR", "TH", "TD"] {
            assert!(tags.iter().any(|x| x == t), "missing {t} in {tags:?}");
        }
    }

    #[test]
    fn long_tables_repeat_headers_without_duplicating_structure() {
        let mut html = String::from("<table><thead><tr><th>Key</th><th>Value</th></tr></thead><tbody>");
        for i in 0..120 {
            html.push_str(&format!("<tr><td>k{i}</td><td>v{i}</td></tr>"));
        }
        html.push_str("</tbody></table>");
        let bytes = render(&html).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 1);
        let tags = tags(&bytes);
        assert_eq!(tags.iter().filter(|t| *t == "TH").count(), 2);
        assert_eq!(tags.iter().filter(|t| *t == "TR").count(), 121);
    }

    /// Decoded operations of every page, in page order.
    fn page_ops(bytes: &[u8]) -> Vec<Vec<Operation>> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|id| doc.get_and_decode_page_content(*id).unwrap().operations)
            .collect()
    }

    fn shows(ops: &[Operation], text: &[u8]) -> bool {
        ops.iter()
            .filter(|op| op.operator == "Tj")
            .any(|op| matches!(&op.operands[0], Object::String(s, _) if s.as_slice() == text))
    }

    #[test]
    fn rows_taller_than_a_page_continue_below_the_repeated_header() {
        let html = format!(
            "<table><thead><tr><th>Key</th><th>Value</th></tr></thead>\
             <tbody><tr><td>notes</td><td>{}</td></tr></tbody></table>",
            "lorem ipsum ".repeat(2000)
        );
        let bytes = render(&html).unwrap();
        let pages = page_ops(&bytes);
        assert!(pages.len() > 2);

        let bottom = StyleSheet::default().margin_pt();
        for (i, ops) in pages.iter().enumerate() {
            for op in ops.iter().filter(|op| op.operator == "Tm") {
                let y = op.operands[5].as_float().unwrap();
                assert!(y >= bottom - 0.01, "page {i}: baseline {y} below the margin");
            }
            assert!(shows(ops, b"Key"), "page {i} lacks the header row");
        }

        let tags = tags(&bytes);
        assert_eq!(tags.iter().filter(|t| *t == "TR").count(), 2);
        assert_eq!(tags.iter().filter(|t| *t == "TH").count(), 2);
    }

    #[test]
    fn nested_tables_are_tagged_tables() {
        let inner = "<table><tr><th>k</th></tr><tr><td>v</td></tr></table>";
        let html = format!(
            "<blockquote>{inner}</blockquote><ul><li>item {inner}</li></ul>\
             <table><tr><td>cell {inner}</td></tr></table>"
        );
        let bytes = render(&html).unwrap();
        let tags = tags(&bytes);
        assert_eq!(tags.iter().filter(|t| *t == "Table").count(), 4);
        assert_eq!(tags.iter().filter(|t| *t == "TH").count(), 3);
        let ops = page_ops(&bytes).concat();
        assert!(shows(&ops, b"cell"));
        assert_eq!(ops.iter().filter(|op| op.operator == "Tj" && matches!(&op.operands[0], Object::String(s, _) if s.as_slice() == b"v")).count(), 3);
    }

    #[test]
    fn non_win_ansi_text_fails() {
        let err = render("<p>漢字</p>").unwrap_err();
        assert_eq!(err.export_format(), Some(ExportFormat::Pdf));
    }

    #[test]
    fn win_ansi_covers_typographic_punctuation() {
        assert_eq!(encode_win_ansi("“a” – b…").unwrap(), vec![0x93, b'a', 0x94, b' ', 0x96, b' ', b'b', 0x85]);
        assert_eq!(encode_win_ansi("é").unwrap(), vec![0xE9]);
    }

    #[test]
    fn wrapping_respects_width() {
        let style = StyleSheet::default();
        let w = PdfWriter::new(&style);
        let runs = [Inline::Text {
            text: "word ".repeat(200),
            style: RunStyle::default(),
        }];
        let lines = w.wrap(&runs, w.body_base(), 200.0);
        assert!(lines.len() > 5);
        assert!(lines.iter().all(|l| l.width() <= 200.0));
    }

    #[test]
    fn over_long_words_are_split() {
        let style = StyleSheet::default();
        let w = PdfWriter::new(&style);
        let runs = [Inline::Text {
            text: "x".repeat(500),
            style: RunStyle::default(),
        }];
        let lines = w.wrap(&runs, w.body_base(), 100.0);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.width() <= 100.0));
    }

    #[test]
    fn font_resources_are_distinct() {
        let names: std::collections::HashSet<String> = Font::all().map(Font::resource).collect();
        assert_eq!(names.len(), 12);
    }
}
