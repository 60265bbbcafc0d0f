//! The single logical style mapping shared by the PDF and DOCX renderers.
//!
//! Both renderers read every size, colour and indent from one [`StyleSheet`]
//! and convert units through the helpers below, so a heading, table border
//! or list indent comes out the same in both formats.

use crate::error::DocRegenError;
use crate::export::layout::RunStyle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An sRGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);

    /// Parse `#RRGGBB`, `RRGGBB` or `#RGB`.
    pub fn from_hex(s: &str) -> Option<Rgb> {
        let hex = s.trim().trim_start_matches('#');
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
        Some(Rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Upper-case `RRGGBB`, as WordprocessingML expects.
    pub fn hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }

    /// Channels in `0.0..=1.0`, as PDF colour operators expect.
    pub fn unit(self) -> (f32, f32, f32) {
        (
            self.0 as f32 / 255.0,
            self.1 as f32 / 255.0,
            self.2 as f32 / 255.0,
        )
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.hex())
    }
}

/// Broad font classification; selects the standard PDF font family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontClass {
    Sans,
    Serif,
    Mono,
}

impl FontClass {
    pub fn of(family: &str) -> FontClass {
        let f = family.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase();
        if f.contains("mono") || f.contains("courier") || f.contains("consolas") || f == "code" {
            FontClass::Mono
        } else if f.contains("times")
            || f.contains("georgia")
            || f.contains("garamond")
            || f.contains("cambria")
            || f == "serif"
        {
            FontClass::Serif
        } else {
            FontClass::Sans
        }
    }

    /// Average glyph advance as a fraction of the font size.
    pub fn avg_advance(self) -> f32 {
        match self {
            FontClass::Mono => 0.6,
            FontClass::Serif => 0.48,
            FontClass::Sans => 0.5,
        }
    }
}

/// Every visual rule applied during export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleSheet {
    /// Body font family used when the HTML does not name one. Default: Arial.
    pub font_family: String,
    /// Body font size in points. Default: 12.
    pub font_size_pt: f32,
    /// Font used for `pre`/`code`. Default: Courier New.
    pub code_font_family: String,
    /// Sizes for `h1`..`h6` in points. Default: 24/20/16/14/13/12.
    pub heading_sizes_pt: [f32; 6],
    /// Page margin on all four sides in millimetres. Default: 25.
    pub margin_mm: f32,
    /// Line height as a multiple of the font size. Default: 1.4.
    pub line_height: f32,
    /// Space after each paragraph in points. Default: 6.
    pub paragraph_spacing_pt: f32,
    /// Table border width in points. Default: 1.
    pub table_border_pt: f32,
    pub table_border_color: Rgb,
    /// Background of header cells. Default: #F3F3F3.
    pub table_header_fill: Rgb,
    /// Inner cell padding in points. Default: 6.
    pub cell_padding_pt: f32,
    /// Indent per list nesting level in points. Default: 18.
    pub list_indent_pt: f32,
    pub text_color: Rgb,
}

impl Default for StyleSheet {
    fn default() -> Self {
        Self {
            font_family: "Arial".to_string(),
            font_size_pt: 12.0,
            code_font_family: "Courier New".to_string(),
            heading_sizes_pt: [24.0, 20.0, 16.0, 14.0, 13.0, 12.0],
            margin_mm: 25.0,
            line_height: 1.4,
            paragraph_spacing_pt: 6.0,
            table_border_pt: 1.0,
            table_border_color: Rgb(0xDD, 0xDD, 0xDD),
            table_header_fill: Rgb(0xF3, 0xF3, 0xF3),
            cell_padding_pt: 6.0,
            list_indent_pt: 18.0,
            text_color: Rgb::BLACK,
        }
    }
}

/// A4 in points.
pub const PAGE_WIDTH_PT: f32 = 595.0;
pub const PAGE_HEIGHT_PT: f32 = 842.0;

impl StyleSheet {
    /// Size for heading `level` (1–6); out-of-range levels are clamped.
    pub fn heading_size(&self, level: u8) -> f32 {
        let idx = level.clamp(1, 6) as usize - 1;
        self.heading_sizes_pt[idx]
    }

    pub fn code_font_size(&self) -> f32 {
        (self.font_size_pt * 0.9).max(6.0)
    }

    /// Space before a heading, proportional to its size.
    pub fn heading_space_before(&self, level: u8) -> f32 {
        self.heading_size(level) * 0.5
    }

    /// Size of a run inside a block whose own size is `base`.
    pub fn run_size(&self, base: f32, run: &RunStyle) -> f32 {
        match run.size_pt {
            Some(size) => size,
            None if run.code => (base * 0.9).max(6.0),
            None => base,
        }
    }

    /// Font family of a run: inline code, then inline CSS, then the body font.
    pub fn run_family<'a>(&'a self, run: &'a RunStyle) -> &'a str {
        if run.code {
            &self.code_font_family
        } else {
            run.family.as_deref().unwrap_or(&self.font_family)
        }
    }

    /// Left indent of list text at nesting `depth` (0 = top level). The
    /// label hangs `list_indent_pt` to the left of it.
    pub fn list_indent(&self, depth: usize) -> f32 {
        self.list_indent_pt * (depth + 1) as f32
    }

    pub fn margin_pt(&self) -> f32 {
        mm_to_pt(self.margin_mm)
    }

    pub fn content_width_pt(&self) -> f32 {
        PAGE_WIDTH_PT - 2.0 * self.margin_pt()
    }

    pub fn validate(&self) -> Result<(), DocRegenError> {
        let bad = |what: &str| Err(DocRegenError::InvalidConfig(what.to_string()));
        if self.font_family.trim().is_empty() {
            return bad("font family must not be empty");
        }
        if !(4.0..=96.0).contains(&self.font_size_pt) {
            return bad("font size must be 4–96 pt");
        }
        if self.heading_sizes_pt.iter().any(|s| !(4.0..=96.0).contains(s)) {
            return bad("heading sizes must be 4–96 pt");
        }
        if !(0.0..=80.0).contains(&self.margin_mm) {
            return bad("margins must be 0–80 mm");
        }
        if !(1.0..=3.0).contains(&self.line_height) {
            return bad("line height must be 1.0–3.0");
        }
        if self.table_border_pt < 0.0 || self.cell_padding_pt < 0.0 || self.list_indent_pt < 0.0 {
            return bad("border, padding and indent must not be negative");
        }
        Ok(())
    }
}

// ── Unit conversion ──────────────────────────────────────────────────────

pub fn mm_to_pt(mm: f32) -> f32 {
    mm * 72.0 / 25.4
}

/// Points to twentieths of a point (twips / dxa).
pub fn pt_to_twips(pt: f32) -> i64 {
    (pt * 20.0).round() as i64
}

/// Points to half-points (`w:sz`).
pub fn pt_to_half_points(pt: f32) -> i64 {
    (pt * 2.0).round() as i64
}

/// Points to eighths of a point (border `w:sz`).
pub fn pt_to_eighths(pt: f32) -> i64 {
    (pt * 8.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colours() {
        assert_eq!(Rgb::from_hex("#DDDDDD"), Some(Rgb(0xDD, 0xDD, 0xDD)));
        assert_eq!(Rgb::from_hex("f3f3f3"), Some(Rgb(0xF3, 0xF3, 0xF3)));
        assert_eq!(Rgb::from_hex("#abc"), Some(Rgb(0xAA, 0xBB, 0xCC)));
        assert_eq!(Rgb::from_hex("#12345"), None);
        assert_eq!(Rgb(1, 2, 255).hex(), "0102FF");
    }

    #[test]
    fn font_classes() {
        assert_eq!(FontClass::of("Arial"), FontClass::Sans);
        assert_eq!(FontClass::of("'Times New Roman'"), FontClass::Serif);
        assert_eq!(FontClass::of("Courier New"), FontClass::Mono);
        assert_eq!(FontClass::of("monospace"), FontClass::Mono);
    }

    #[test]
    fn heading_sizes_clamp() {
        let s = StyleSheet::default();
        assert_eq!(s.heading_size(1), 24.0);
        assert_eq!(s.heading_size(6), 12.0);
        assert_eq!(s.heading_size(9), 12.0);
    }

    #[test]
    fn run_sizes_and_families() {
        let s = StyleSheet::default();
        let code = RunStyle {
            code: true,
            ..RunStyle::default()
        };
        assert_eq!(s.run_size(20.0, &code), 18.0);
        assert_eq!(s.run_family(&code), "Courier New");
        assert_eq!(s.run_family(&RunStyle::default()), "Arial");
        let sized = RunStyle {
            size_pt: Some(9.0),
            ..RunStyle::default()
        };
        assert_eq!(s.run_size(24.0, &sized), 9.0);
    }

    #[test]
    fn unit_conversions() {
        assert_eq!(pt_to_twips(6.0), 120);
        assert_eq!(pt_to_half_points(12.0), 24);
        assert_eq!(pt_to_eighths(1.0), 8);
        assert!((mm_to_pt(25.4) - 72.0).abs() < 1e-4);
    }

    #[test]
    fn validation_rejects_nonsense() {
        let mut s = StyleSheet::default();
        assert!(s.validate().is_ok());
        s.font_size_pt = 0.0;
        assert!(s.validate().is_err());
    }
}
