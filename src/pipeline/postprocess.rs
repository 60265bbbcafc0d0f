//! Post-processing: deterministic cleanup of LLM-generated HTML.
//!
//! Even when told to return bare HTML, models wrap output in ```` ```html ````
//! fences, emit Markdown headings, add `<html>`/`<body>` wrappers or change
//! the level of the leading heading. Each rule below is a pure `&str → String`
//! pass and is tested on its own.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so the line-anchored rules see `\n`
//! only; fences are stripped before Markdown headings are converted so a
//! fenced heading is still found; backticks are removed last, after fences
//! no longer need them. The heading and backtick rules never touch the
//! content of `<pre>` and `<code>` elements.

use crate::html;
use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule to raw writer output.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip ```` ``` ```` / ```` ```html ```` fence markers
/// 3. Drop a bare `html` label on the first line
/// 4. Unwrap `<!DOCTYPE>`, `<html>`, `<head>` and `<body>` wrappers
/// 5. Convert Markdown `#`..`######` heading lines to `<h1>`..`<h6>`,
///    outside `<pre>`/`<code>`
/// 6. Remove stray backticks, outside `<pre>`/`<code>`
/// 7. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 8. Trim surrounding whitespace
pub fn clean_html(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_fences(&s);
    let s = strip_language_label(&s);
    let s = unwrap_document(&s);
    let s = outside_code(&s, |s| remove_backticks(&convert_markdown_headings(s)));
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip fences ─────────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[ \t]*(?i:html)?").unwrap());

fn strip_fences(input: &str) -> String {
    RE_FENCE.replace_all(input, "").into_owned()
}

// ── Rule 3: Language label ───────────────────────────────────────────────

static RE_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?i:html)[ \t]*\n").unwrap());

fn strip_language_label(input: &str) -> String {
    RE_LABEL.replace(input, "").into_owned()
}

// ── Rule 4: Unwrap document wrappers ─────────────────────────────────────

static RE_BODY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<body[^>]*>(.*)</body\s*>").unwrap());
static RE_WRAPPERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<!doctype[^>]*>|<head[^>]*>.*?</head\s*>|</?html[^>]*>|</?body[^>]*>").unwrap()
});

fn unwrap_document(input: &str) -> String {
    let inner = match RE_BODY.captures(input) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    };
    RE_WRAPPERS.replace_all(&inner, "").into_owned()
}

// ── Rule 5: Markdown headings ────────────────────────────────────────────

static RE_MD_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*(#{1,6})[ \t]+(.+?)[ \t#]*$").unwrap());

fn convert_markdown_headings(input: &str) -> String {
    RE_MD_HEADING
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let level = caps[1].len();
            format!("<h{level}>{}</h{level}>", caps[2].trim())
        })
        .into_owned()
}

// ── Rule 6: Stray backticks ──────────────────────────────────────────────

fn remove_backticks(input: &str) -> String {
    input.replace('`', "")
}

// ── Code spans ───────────────────────────────────────────────────────────

static RE_CODE_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<pre\b[^>]*>.*?</pre\s*>|<code\b[^>]*>.*?</code\s*>").unwrap());
static RE_SPAN_MARK: Lazy<Regex> = Lazy::new(|| Regex::new("\u{E000}(\\d+)\u{E001}").unwrap());

/// Apply `rule` to everything outside `<pre>` and `<code>` elements. Code
/// spans are swapped for single-line markers while `rule` runs, so a marker
/// never looks like the start of a line.
fn outside_code(input: &str, rule: impl Fn(&str) -> String) -> String {
    let mut spans: Vec<String> = Vec::new();
    let masked = RE_CODE_SPAN.replace_all(input, |caps: &regex::Captures<'_>| {
        spans.push(caps[0].to_string());
        format!("\u{E000}{}\u{E001}", spans.len() - 1)
    });
    if spans.is_empty() {
        return rule(input);
    }
    let done = rule(masked.as_ref());
    RE_SPAN_MARK
        .replace_all(&done, |caps: &regex::Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| spans.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

// ── Rule 7: Invisible characters ─────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
            )
        })
        .collect()
}

// ── Heading re-levelling ─────────────────────────────────────────────────

static RE_LEADING_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*<[hH]([1-6])(\s[^>]*)?>").unwrap());

/// Force the leading heading of `fragment` to `level`, keeping its
/// attributes and content. Fragments that do not start with a heading, and
/// `level == 0`, are returned unchanged.
pub fn relevel_leading_heading(fragment: &str, level: u8) -> String {
    if html::heading_level(&format!("h{level}")).is_none() {
        return fragment.to_string();
    }
    let Some(caps) = RE_LEADING_HEADING.captures(fragment) else {
        return fragment.to_string();
    };
    let current = &caps[1];
    if current == level.to_string() {
        return fragment.to_string();
    }

    let open = caps.get(0).map_or(0..0, |m| m.range());
    let attrs = caps.get(2).map_or("", |m| m.as_str());
    let rest = &fragment[open.end..];
    let close_lower = format!("</h{current}>");
    let close_upper = format!("</H{current}>");
    let close_at = match (rest.find(&close_lower), rest.find(&close_upper)) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => return fragment.to_string(),
    };

    format!(
        "{}<h{level}{attrs}>{}</h{level}>{}",
        &fragment[..open.start],
        &rest[..close_at],
        &rest[close_at + close_lower.len()..]
    )
}
