//! DOCX renderer: [`Layout`] → WordprocessingML package via `quick-xml` and
//! `zip`.
//!
//! Every size, indent and colour is taken from the same [`StyleSheet`] the
//! PDF renderer reads and converted with the unit helpers in
//! [`crate::export::style`]. Run properties are written explicitly on every
//! run rather than left to style inheritance, so Word shows exactly the
//! sizes the PDF uses.
//!
//! Package parts: `[Content_Types].xml`, `_rels/.rels`, `docProps/core.xml`,
//! `word/document.xml`, `word/styles.xml`, `word/numbering.xml` and
//! `word/_rels/document.xml.rels`.

use crate::error::{DocRegenError, ExportFormat};
use crate::export::layout::{Align, Block, Inline, Layout, List, RunStyle, Table};
use crate::export::style::{
    pt_to_eighths, pt_to_half_points, pt_to_twips, StyleSheet, PAGE_HEIGHT_PT, PAGE_WIDTH_PT,
};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

type Result<T> = std::result::Result<T, DocRegenError>;

fn fail(detail: impl Into<String>) -> DocRegenError {
    DocRegenError::render(ExportFormat::Docx, detail)
}

const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Document metadata written to `docProps/core.xml`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxMeta<'a> {
    pub title: Option<&'a str>,
    pub author: Option<&'a str>,
}

/// Render `layout` to DOCX bytes.
pub fn render_docx(layout: &Layout, style: &StyleSheet, meta: DocxMeta<'_>) -> Result<Vec<u8>> {
    let mut body = BodyWriter::new(style)?;
    body.document(layout)?;
    let lists = std::mem::take(&mut body.lists);
    let document = body.xml.finish()?;
    debug!("DOCX layout: {} blocks, {} lists", layout.blocks.len(), lists.len());

    let parts: [(&str, Vec<u8>); 7] = [
        ("[Content_Types].xml", content_types()?),
        ("_rels/.rels", package_rels()?),
        ("docProps/core.xml", core_props(meta)?),
        ("word/document.xml", document),
        ("word/styles.xml", styles(style)?),
        ("word/numbering.xml", numbering(style, &lists)?),
        ("word/_rels/document.xml.rels", document_rels()?),
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in parts {
        zip.start_file(name, options)
            .map_err(|e| fail(format!("zip entry {name}: {e}")))?;
        zip.write_all(&bytes)
            .map_err(|e| fail(format!("zip entry {name}: {e}")))?;
    }
    let cursor = zip.finish().map_err(|e| fail(format!("zip: {e}")))?;
    Ok(cursor.into_inner())
}

// ── XML helper ───────────────────────────────────────────────────────────

struct Xml {
    w: Writer<Vec<u8>>,
}

impl Xml {
    fn new() -> Result<Self> {
        let mut w = Writer::new(Vec::new());
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
            .map_err(xml_err)?;
        Ok(Self { w })
    }

    fn open(&mut self, tag: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let start = BytesStart::new(tag).with_attributes(attrs.iter().copied());
        self.w.write_event(Event::Start(start)).map_err(xml_err)
    }

    fn close(&mut self, tag: &str) -> Result<()> {
        self.w.write_event(Event::End(BytesEnd::new(tag))).map_err(xml_err)
    }

    fn empty(&mut self, tag: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let start = BytesStart::new(tag).with_attributes(attrs.iter().copied());
        self.w.write_event(Event::Empty(start)).map_err(xml_err)
    }

    /// `<tag>text</tag>` with whitespace preserved.
    fn text(&mut self, tag: &str, text: &str) -> Result<()> {
        self.open(tag, &[("xml:space", "preserve")])?;
        let clean: String = text
            .chars()
            .filter(|&c| c == '\t' || c >= ' ')
            .collect();
        self.w
            .write_event(Event::Text(BytesText::new(&clean)))
            .map_err(xml_err)?;
        self.close(tag)
    }

    /// `<w:tag w:val="…"/>`
    fn val(&mut self, tag: &str, val: impl ToString) -> Result<()> {
        let v = val.to_string();
        self.empty(tag, &[("w:val", &v)])
    }

    fn finish(self) -> Result<Vec<u8>> {
        Ok(self.w.into_inner())
    }
}

fn xml_err(e: quick_xml::Error) -> DocRegenError {
    fail(format!("xml: {e}"))
}

// ── document.xml ─────────────────────────────────────────────────────────

/// Font and size a run inherits from its block.
#[derive(Debug, Clone, Copy)]
struct RunBase {
    size: f32,
    bold: bool,
}

#[derive(Debug, Default)]
struct ParaProps<'s> {
    style: Option<&'s str>,
    keep_next: bool,
    num: Option<(usize, usize)>,
    before_pt: f32,
    after_pt: f32,
    indent_pt: f32,
    hanging_pt: f32,
    align: Align,
}

/// One `w:num` per rendered list: (ordered, start).
type ListDef = (bool, usize);

struct BodyWriter<'a> {
    style: &'a StyleSheet,
    xml: Xml,
    lists: Vec<ListDef>,
    /// Left indent of quotations and list item content.
    indent_pt: f32,
    /// Body text is bold inside header cells.
    strong: bool,
    /// A cell must not end with a table.
    after_table: bool,
    /// Content width while writing a table cell.
    cell_width: Option<i64>,
}

impl<'a> BodyWriter<'a> {
    fn new(style: &'a StyleSheet) -> Result<Self> {
        Ok(Self {
            style,
            xml: Xml::new()?,
            lists: Vec::new(),
            indent_pt: 0.0,
            strong: false,
            after_table: false,
            cell_width: None,
        })
    }

    fn document(&mut self, layout: &Layout) -> Result<()> {
        self.xml.open("w:document", &[("xmlns:w", NS_W), ("xmlns:r", NS_R)])?;
        self.xml.open("w:body", &[])?;
        for block in &layout.blocks {
            self.block(block)?;
        }
        self.section()?;
        self.xml.close("w:body")?;
        self.xml.close("w:document")
    }

    fn body_base(&self) -> RunBase {
        RunBase {
            size: self.style.font_size_pt,
            bold: self.strong,
        }
    }

    fn heading_base(&self, level: u8) -> RunBase {
        RunBase {
            size: self.style.heading_size(level),
            bold: true,
        }
    }

    fn content_twips(&self) -> i64 {
        pt_to_twips((self.style.content_width_pt() - self.indent_pt).max(1.0))
    }

    fn block(&mut self, block: &Block) -> Result<()> {
        let style = self.style;
        match block {
            Block::Heading {
                level,
                content,
                align,
            } => {
                let level = (*level).clamp(1, 6);
                let style_id = format!("Heading{level}");
                let props = ParaProps {
                    style: Some(style_id.as_str()),
                    keep_next: true,
                    before_pt: style.heading_space_before(level),
                    after_pt: style.paragraph_spacing_pt,
                    align: *align,
                    ..ParaProps::default()
                };
                self.paragraph(&props, content, self.heading_base(level))?;
            }
            Block::Paragraph { content, align } => {
                let props = ParaProps {
                    after_pt: style.paragraph_spacing_pt,
                    align: *align,
                    ..ParaProps::default()
                };
                self.paragraph(&props, content, self.body_base())?;
            }
            Block::List(list) => {
                self.list(list, 0)?;
                self.spacer()?;
            }
            Block::Table(table) => {
                self.table(table, self.content_twips())?;
                self.spacer()?;
            }
            Block::Code(text) => self.code(text, style.paragraph_spacing_pt)?,
            Block::Quote(blocks) => {
                self.indent_pt += style.list_indent_pt;
                for inner in blocks {
                    self.block(inner)?;
                }
                self.indent_pt -= style.list_indent_pt;
            }
            Block::Rule => {
                let sz = pt_to_eighths(style.table_border_pt.max(0.5)).to_string();
                let color = style.table_border_color.hex();
                let after = pt_to_twips(style.paragraph_spacing_pt).to_string();
                let x = &mut self.xml;
                x.open("w:p", &[])?;
                x.open("w:pPr", &[])?;
                x.open("w:pBdr", &[])?;
                x.empty(
                    "w:bottom",
                    &[("w:val", "single"), ("w:sz", &sz), ("w:space", "1"), ("w:color", &color)],
                )?;
                x.close("w:pBdr")?;
                x.empty("w:spacing", &[("w:before", &after), ("w:after", &after)])?;
                x.close("w:pPr")?;
                x.close("w:p")?;
            }
            Block::PageBreak => {
                let x = &mut self.xml;
                x.open("w:p", &[])?;
                x.open("w:r", &[])?;
                x.empty("w:br", &[("w:type", "page")])?;
                x.close("w:r")?;
                x.close("w:p")?;
            }
        }
        Ok(())
    }

    /// One paragraph per source line; `after_pt` follows the last one.
    fn code(&mut self, text: &str, after_pt: f32) -> Result<()> {
        let size = self.style.code_font_size();
        let lines: Vec<&str> = text.split('\n').collect();
        let base = RunBase { size, bold: false };
        for (i, line) in lines.iter().enumerate() {
            let props = ParaProps {
                style: Some("Code"),
                after_pt: if i + 1 == lines.len() { after_pt } else { 0.0 },
                ..ParaProps::default()
            };
            let runs = [Inline::Text {
                text: line.to_string(),
                style: RunStyle {
                    code: true,
                    size_pt: Some(size),
                    ..RunStyle::default()
                },
            }];
            self.paragraph(&props, &runs, base)?;
        }
        Ok(())
    }

    fn paragraph(&mut self, props: &ParaProps<'_>, runs: &[Inline], base: RunBase) -> Result<()> {
        self.after_table = false;
        self.xml.open("w:p", &[])?;
        self.paragraph_props(props)?;
        for run in runs {
            match run {
                Inline::LineBreak => {
                    self.xml.open("w:r", &[])?;
                    self.xml.empty("w:br", &[])?;
                    self.xml.close("w:r")?;
                }
                Inline::Text { text, style } => self.run(text, style, base)?,
            }
        }
        self.xml.close("w:p")
    }

    fn paragraph_props(&mut self, p: &ParaProps<'_>) -> Result<()> {
        let line = ((self.style.line_height * 240.0).round() as i64).to_string();
        let before = pt_to_twips(p.before_pt).to_string();
        let indent = p.indent_pt + self.indent_pt;
        let after = pt_to_twips(p.after_pt).to_string();
        let x = &mut self.xml;
        x.open("w:pPr", &[])?;
        if let Some(style) = p.style {
            x.val("w:pStyle", style)?;
        }
        if p.keep_next {
            x.empty("w:keepNext", &[])?;
        }
        if let Some((num_id, level)) = p.num {
            x.open("w:numPr", &[])?;
            x.val("w:ilvl", level)?;
            x.val("w:numId", num_id)?;
            x.close("w:numPr")?;
        }
        x.empty(
            "w:spacing",
            &[
                ("w:before", &before),
                ("w:after", &after),
                ("w:line", &line),
                ("w:lineRule", "auto"),
            ],
        )?;
        if indent > 0.0 || p.hanging_pt > 0.0 {
            let left = pt_to_twips(indent).to_string();
            let hanging = pt_to_twips(p.hanging_pt).to_string();
            x.empty("w:ind", &[("w:left", &left), ("w:hanging", &hanging)])?;
        }
        match p.align {
            Align::Left => {}
            Align::Center => x.val("w:jc", "center")?,
            Align::Right => x.val("w:jc", "right")?,
        }
        x.close("w:pPr")
    }

    fn run(&mut self, text: &str, run: &RunStyle, base: RunBase) -> Result<()> {
        let family = self.style.run_family(run).to_string();
        let size = pt_to_half_points(self.style.run_size(base.size, run)).to_string();
        let color = self.style.text_color.hex();
        let x = &mut self.xml;
        x.open("w:r", &[])?;
        x.open("w:rPr", &[])?;
        x.empty(
            "w:rFonts",
            &[("w:ascii", &family), ("w:hAnsi", &family), ("w:cs", &family)],
        )?;
        if base.bold || run.bold {
            x.empty("w:b", &[])?;
        }
        if run.italic {
            x.empty("w:i", &[])?;
        }
        x.val("w:color", &color)?;
        x.val("w:sz", &size)?;
        x.val("w:szCs", &size)?;
        if run.underline {
            x.val("w:u", "single")?;
        }
        x.close("w:rPr")?;
        x.text("w:t", text)?;
        x.close("w:r")
    }

    /// Empty paragraph exactly `paragraph_spacing_pt` high.
    fn spacer(&mut self) -> Result<()> {
        let h = pt_to_twips(self.style.paragraph_spacing_pt).max(1).to_string();
        let x = &mut self.xml;
        x.open("w:p", &[])?;
        x.open("w:pPr", &[])?;
        x.empty(
            "w:spacing",
            &[("w:before", "0"), ("w:after", "0"), ("w:line", &h), ("w:lineRule", "exact")],
        )?;
        x.close("w:pPr")?;
        x.close("w:p")
    }

    fn list(&mut self, list: &List, depth: usize) -> Result<()> {
        self.lists.push((list.ordered, list.start));
        let num_id = self.lists.len();
        for item in &list.items {
            let props = ParaProps {
                style: Some("ListParagraph"),
                num: Some((num_id, depth.min(8))),
                indent_pt: self.style.list_indent(depth),
                hanging_pt: self.style.list_indent_pt,
                ..ParaProps::default()
            };
            self.paragraph(&props, &item.content, self.body_base())?;
            for child in &item.children {
                match child {
                    Block::List(nested) => self.list(nested, depth + 1)?,
                    other => {
                        let indent = self.style.list_indent(depth);
                        self.indent_pt += indent;
                        match self.cell_width {
                            Some(width) => self.cell_blocks(std::slice::from_ref(other), width)?,
                            None => self.block(other)?,
                        }
                        self.indent_pt -= indent;
                    }
                }
            }
        }
        Ok(())
    }

    /// Write `table` `total` twips wide.
    fn table(&mut self, table: &Table, total: i64) -> Result<()> {
        let style = self.style;
        let col = total / table.columns.max(1) as i64;
        let pad_twips = pt_to_twips(style.cell_padding_pt);
        let indent = pt_to_twips(self.indent_pt).to_string();
        let border_sz = pt_to_eighths(style.table_border_pt).to_string();
        let border_color = style.table_border_color.hex();
        let pad = pad_twips.to_string();
        let total_s = total.to_string();
        let col_s = col.to_string();

        let x = &mut self.xml;
        x.open("w:tbl", &[])?;
        x.open("w:tblPr", &[])?;
        x.empty("w:tblW", &[("w:w", &total_s), ("w:type", "dxa")])?;
        if self.indent_pt > 0.0 {
            x.empty("w:tblInd", &[("w:w", &indent), ("w:type", "dxa")])?;
        }
        x.open("w:tblBorders", &[])?;
        for side in ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"] {
            if style.table_border_pt > 0.0 {
                x.empty(
                    side,
                    &[("w:val", "single"), ("w:sz", &border_sz), ("w:space", "0"), ("w:color", &border_color)],
                )?;
            } else {
                x.val(side, "nil")?;
            }
        }
        x.close("w:tblBorders")?;
        x.empty("w:tblLayout", &[("w:type", "fixed")])?;
        x.open("w:tblCellMar", &[])?;
        for side in ["w:top", "w:left", "w:bottom", "w:right"] {
            x.empty(side, &[("w:w", &pad), ("w:type", "dxa")])?;
        }
        x.close("w:tblCellMar")?;
        x.close("w:tblPr")?;

        x.open("w:tblGrid", &[])?;
        for _ in 0..table.columns {
            x.empty("w:gridCol", &[("w:w", &col_s)])?;
        }
        x.close("w:tblGrid")?;

        let fill = style.table_header_fill.hex();
        for row in &table.rows {
            self.xml.open("w:tr", &[])?;
            if row.header {
                self.xml.open("w:trPr", &[])?;
                self.xml.empty("w:tblHeader", &[])?;
                self.xml.close("w:trPr")?;
            }
            for cell in &row.cells {
                let width = (col * cell.colspan as i64).to_string();
                self.xml.open("w:tc", &[])?;
                self.xml.open("w:tcPr", &[])?;
                self.xml.empty("w:tcW", &[("w:w", &width), ("w:type", "dxa")])?;
                if cell.colspan > 1 {
                    self.xml.val("w:gridSpan", cell.colspan)?;
                }
                if cell.header {
                    self.xml.empty(
                        "w:shd",
                        &[("w:val", "clear"), ("w:color", "auto"), ("w:fill", &fill)],
                    )?;
                }
                self.xml.close("w:tcPr")?;
                let inner = (col * cell.colspan as i64 - 2 * pad_twips).max(1);
                self.cell(&cell.content, cell.header, inner)?;
                self.xml.close("w:tc")?;
            }
            self.xml.close("w:tr")?;
        }
        self.xml.close("w:tbl")?;
        self.after_table = true;
        Ok(())
    }

    /// Cell content `width` twips wide: no spacing between blocks, nested
    /// tables as real tables.
    fn cell(&mut self, blocks: &[Block], header: bool, width: i64) -> Result<()> {
        let saved = (self.indent_pt, self.strong, self.cell_width);
        self.indent_pt = 0.0;
        self.strong = header;
        self.cell_width = Some(width);
        self.after_table = false;
        let written = self.cell_blocks(blocks, width);
        (self.indent_pt, self.strong, self.cell_width) = saved;
        written?;
        if blocks.is_empty() || self.after_table {
            self.xml.empty("w:p", &[])?;
        }
        Ok(())
    }

    fn cell_blocks(&mut self, blocks: &[Block], width: i64) -> Result<()> {
        let style = self.style;
        for block in blocks {
            match block {
                Block::Heading {
                    level,
                    content,
                    align,
                } => {
                    let level = (*level).clamp(1, 6);
                    let style_id = format!("Heading{level}");
                    let props = ParaProps {
                        style: Some(style_id.as_str()),
                        align: *align,
                        ..ParaProps::default()
                    };
                    self.paragraph(&props, content, self.heading_base(level))?;
                }
                Block::Paragraph { content, align } => {
                    let props = ParaProps {
                        align: *align,
                        ..ParaProps::default()
                    };
                    self.paragraph(&props, content, self.body_base())?;
                }
                Block::List(list) => self.list(list, 0)?,
                Block::Table(table) => {
                    let indent = pt_to_twips(self.indent_pt);
                    self.table(table, (width - indent).max(1))?;
                }
                Block::Code(text) => self.code(text, 0.0)?,
                Block::Quote(inner) => {
                    self.indent_pt += style.list_indent_pt;
                    self.cell_blocks(inner, width)?;
                    self.indent_pt -= style.list_indent_pt;
                }
                Block::Rule | Block::PageBreak => {}
            }
        }
        Ok(())
    }

    fn section(&mut self) -> Result<()> {
        let w = pt_to_twips(PAGE_WIDTH_PT).to_string();
        let h = pt_to_twips(PAGE_HEIGHT_PT).to_string();
        let m = pt_to_twips(self.style.margin_pt()).to_string();
        let x = &mut self.xml;
        x.open("w:sectPr", &[])?;
        x.empty("w:pgSz", &[("w:w", &w), ("w:h", &h)])?;
        x.empty(
            "w:pgMar",
            &[
                ("w:top", &m),
                ("w:right", &m),
                ("w:bottom", &m),
                ("w:left", &m),
                ("w:header", "708"),
                ("w:footer", "708"),
                ("w:gutter", "0"),
            ],
        )?;
        x.close("w:sectPr")
    }
}

// ── Other parts ──────────────────────────────────────────────────────────

fn styles(style: &StyleSheet) -> Result<Vec<u8>> {
    let family = style.font_family.as_str();
    let size = pt_to_half_points(style.font_size_pt).to_string();
    let after = pt_to_twips(style.paragraph_spacing_pt).to_string();
    let line = ((style.line_height * 240.0).round() as i64).to_string();
    let color = style.text_color.hex();

    let mut x = Xml::new()?;
    x.open("w:styles", &[("xmlns:w", NS_W)])?;

    x.open("w:docDefaults", &[])?;
    x.open("w:rPrDefault", &[])?;
    x.open("w:rPr", &[])?;
    x.empty("w:rFonts", &[("w:ascii", family), ("w:hAnsi", family), ("w:cs", family)])?;
    x.val("w:color", &color)?;
    x.val("w:sz", &size)?;
    x.val("w:szCs", &size)?;
    x.close("w:rPr")?;
    x.close("w:rPrDefault")?;
    x.open("w:pPrDefault", &[])?;
    x.open("w:pPr", &[])?;
    x.empty(
        "w:spacing",
        &[("w:after", &after), ("w:line", &line), ("w:lineRule", "auto")],
    )?;
    x.close("w:pPr")?;
    x.close("w:pPrDefault")?;
    x.close("w:docDefaults")?;

    x.open("w:style", &[("w:type", "paragraph"), ("w:default", "1"), ("w:styleId", "Normal")])?;
    x.val("w:name", "Normal")?;
    x.empty("w:qFormat", &[])?;
    x.close("w:style")?;

    for level in 1..=6u8 {
        let id = format!("Heading{level}");
        let name = format!("heading {level}");
        let hs = pt_to_half_points(style.heading_size(level)).to_string();
        x.open("w:style", &[("w:type", "paragraph"), ("w:styleId", &id)])?;
        x.val("w:name", &name)?;
        x.val("w:basedOn", "Normal")?;
        x.val("w:next", "Normal")?;
        x.empty("w:qFormat", &[])?;
        x.open("w:pPr", &[])?;
        x.empty("w:keepNext", &[])?;
        x.val("w:outlineLvl", level - 1)?;
        x.close("w:pPr")?;
        x.open("w:rPr", &[])?;
        x.empty("w:b", &[])?;
        x.val("w:sz", &hs)?;
        x.val("w:szCs", &hs)?;
        x.close("w:rPr")?;
        x.close("w:style")?;
    }

    for (id, name) in [("ListParagraph", "List Paragraph"), ("Code", "Code"), ("Quote", "Quote")] {
        x.open("w:style", &[("w:type", "paragraph"), ("w:styleId", id)])?;
        x.val("w:name", name)?;
        x.val("w:basedOn", "Normal")?;
        x.close("w:style")?;
    }

    x.close("w:styles")?;
    x.finish()
}

fn numbering(style: &StyleSheet, lists: &[ListDef]) -> Result<Vec<u8>> {
    let hanging = pt_to_twips(style.list_indent_pt).to_string();
    let mut x = Xml::new()?;
    x.open("w:numbering", &[("xmlns:w", NS_W)])?;

    for (i, &(ordered, start)) in lists.iter().enumerate() {
        let id = i.to_string();
        x.open("w:abstractNum", &[("w:abstractNumId", &id)])?;
        x.val("w:multiLevelType", "hybridMultilevel")?;
        for level in 0..9usize {
            let lvl = level.to_string();
            let left = pt_to_twips(style.list_indent(level)).to_string();
            let probe = List {
                ordered,
                start,
                items: Vec::new(),
            };
            let text = if ordered {
                format!("%{}.", level + 1)
            } else {
                probe.label(0, level)
            };
            x.open("w:lvl", &[("w:ilvl", &lvl)])?;
            x.val("w:start", start)?;
            x.val("w:numFmt", if ordered { "decimal" } else { "bullet" })?;
            x.val("w:lvlText", &text)?;
            x.val("w:lvlJc", "left")?;
            x.open("w:pPr", &[])?;
            x.empty("w:ind", &[("w:left", &left), ("w:hanging", &hanging)])?;
            x.close("w:pPr")?;
            x.close("w:lvl")?;
        }
        x.close("w:abstractNum")?;
    }
    for i in 0..lists.len() {
        let num_id = (i + 1).to_string();
        x.open("w:num", &[("w:numId", &num_id)])?;
        x.val("w:abstractNumId", i)?;
        x.close("w:num")?;
    }

    x.close("w:numbering")?;
    x.finish()
}

fn content_types() -> Result<Vec<u8>> {
    let mut x = Xml::new()?;
    x.open(
        "Types",
        &[("xmlns", "http://schemas.openxmlformats.org/package/2006/content-types")],
    )?;
    x.empty(
        "Default",
        &[("Extension", "rels"), ("ContentType", "application/vnd.openxmlformats-package.relationships+xml")],
    )?;
    x.empty("Default", &[("Extension", "xml"), ("ContentType", "application/xml")])?;
    for (part, ty) in [
        ("/word/document.xml", "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"),
        ("/word/styles.xml", "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"),
        ("/word/numbering.xml", "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml"),
        ("/docProps/core.xml", "application/vnd.openxmlformats-package.core-properties+xml"),
    ] {
        x.empty("Override", &[("PartName", part), ("ContentType", ty)])?;
    }
    x.close("Types")?;
    x.finish()
}

fn package_rels() -> Result<Vec<u8>> {
    relationships(&[
        (
            "rId1",
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument",
            "word/document.xml",
        ),
        (
            "rId2",
            "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties",
            "docProps/core.xml",
        ),
    ])
}

fn document_rels() -> Result<Vec<u8>> {
    relationships(&[
        (
            "rId1",
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles",
            "styles.xml",
        ),
        (
            "rId2",
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering",
            "numbering.xml",
        ),
    ])
}

fn relationships(rels: &[(&str, &str, &str)]) -> Result<Vec<u8>> {
    let mut x = Xml::new()?;
    x.open("Relationships", &[("xmlns", NS_REL)])?;
    for &(id, ty, target) in rels {
        x.empty("Relationship", &[("Id", id), ("Type", ty), ("Target", target)])?;
    }
    x.close("Relationships")?;
    x.finish()
}

fn core_props(meta: DocxMeta<'_>) -> Result<Vec<u8>> {
    let mut x = Xml::new()?;
    x.open(
        "cp:coreProperties",
        &[
            ("xmlns:cp", "http://schemas.openxmlformats.org/package/2006/metadata/core-properties"),
            ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
            ("xmlns:dcterms", "http://purl.org/dc/terms/"),
            ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
        ],
    )?;
    if let Some(title) = meta.title {
        x.text("dc:title", title)?;
    }
    if let Some(author) = meta.author {
        x.text("dc:creator", author)?;
    }
    x.close("cp:coreProperties")?;
    x.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::layout::layout;
    use std::io::Read;

    fn render(html: &str) -> Vec<u8> {
        let style = StyleSheet::default();
        render_docx(&layout(html, 12.0).unwrap(), &style, DocxMeta::default()).unwrap()
    }

    fn part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut s = String::new();
        file.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn package_has_required_parts() {
        let bytes = render("<p>x</p>");
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        for name in [
            "[Content_Types].xml",
            "_rels/.rels",
            "word/document.xml",
            "word/styles.xml",
            "word/numbering.xml",
            "word/_rels/document.xml.rels",
            "docProps/core.xml",
        ] {
            assert!(archive.by_name(name).is_ok(), "missing {name}");
        }
    }

    #[test]
    fn heading_sizes_come_from_the_stylesheet() {
        let doc = part(&render("<h1>A</h1><h3>B</h3>"), "word/document.xml");
        assert!(doc.contains("<w:pStyle w:val=\"Heading1\"/>"));
        assert!(doc.contains("<w:sz w:val=\"48\"/>"));
        assert!(doc.contains("<w:sz w:val=\"32\"/>"));
    }

    #[test]
    fn tables_mark_header_rows_and_spans() {
        let doc = part(
            &render("<table><thead><tr><th colspan=\"2\">H</th></tr></thead><tr><td>a</td><td>b</td></tr></table>"),
            "word/document.xml",
        );
        assert_eq!(doc.matches("<w:tblHeader/>").count(), 1);
        assert!(doc.contains("<w:gridSpan w:val=\"2\"/>"));
        assert!(doc.contains("w:fill=\"F3F3F3\""));
        assert!(doc.contains("w:sz=\"8\""));
    }

    #[test]
    fn text_is_escaped() {
        let doc = part(&render("<p>a &lt; b &amp; c</p>"), "word/document.xml");
        assert!(doc.contains("a &lt; b &amp; c"));
    }

    #[test]
    fn non_latin_text_is_fine() {
        let doc = part(&render("<p>漢字</p>"), "word/document.xml");
        assert!(doc.contains("漢字"));
    }

    #[test]
    fn lists_get_numbering_definitions() {
        let bytes = render("<ol><li>a<ul><li>b</li></ul></li></ol>");
        let numbering = part(&bytes, "word/numbering.xml");
        assert_eq!(numbering.matches("<w:abstractNum ").count(), 2);
        assert!(numbering.contains("w:val=\"decimal\""));
        assert!(numbering.contains("w:val=\"bullet\""));
        let doc = part(&bytes, "word/document.xml");
        assert!(doc.contains("<w:ilvl w:val=\"1\"/>"));
    }

    #[test]
    fn nested_tables_are_real_tables() {
        let inner = "<table><tr><th>k</th></tr><tr><td>v</td></tr></table>";
        let html = format!(
            "<blockquote>{inner}</blockquote><ul><li>item {inner}</li></ul>\
             <table><tr><td>cell {inner}</td></tr></table>"
        );
        let doc = part(&render(&html), "word/document.xml");
        assert_eq!(doc.matches("<w:tbl>").count(), 4);
        assert_eq!(doc.matches("<w:tblHeader/>").count(), 3);
        assert_eq!(doc.matches("<w:tblInd ").count(), 2, "quoted and listed tables are indented");
        assert!(doc.contains("</w:tbl><w:p/></w:tc>"), "cells end with a paragraph");
    }

    #[test]
    fn header_cell_text_is_bold() {
        let doc = part(&render("<table><tr><th>H</th></tr><tr><td>d</td></tr></table>"), "word/document.xml");
        let header = doc.split("<w:tblHeader/>").nth(1).unwrap();
        let header_row = &header[..header.find("</w:tr>").unwrap()];
        assert!(header_row.contains("<w:b/>"));
    }

    #[test]
    fn page_size_matches_a4_points() {
        let doc = part(&render("<p>x</p>"), "word/document.xml");
        assert!(doc.contains("<w:pgSz w:w=\"11900\" w:h=\"16840\"/>"));
    }
}
