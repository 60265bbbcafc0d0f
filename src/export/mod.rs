//! Export Reconciler: render the final HTML to PDF and DOCX with one shared
//! style mapping.
//!
//! ## Data Flow
//!
//! ```text
//! HTML ──▶ formatter ──▶ layout ──┬──▶ pdf  ──▶ PDF bytes
//!          (title, cover)  (blocks) └──▶ docx ──▶ DOCX bytes
//! ```
//!
//! 1. [`formatter`] — duplicate-title removal and the cover page
//! 2. [`layout`]    — HTML → format-neutral blocks, inline CSS checks
//! 3. [`style`]     — the [`StyleSheet`](style::StyleSheet) both renderers read
//! 4. [`pdf`]       — tagged PDF via `lopdf`
//! 5. [`docx`]      — WordprocessingML via `quick-xml` + `zip`
//!
//! The formats share no mutable state; a failure in one never affects the
//! other.

pub mod docx;
pub mod formatter;
pub mod layout;
pub mod pdf;
pub mod style;

use crate::config::ExportConfig;
use crate::error::{DocRegenError, ExportFormat};
use crate::output::write_atomic;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Render `html` to `format`.
///
/// # Errors
/// [`DocRegenError::ExportRender`] naming `format` when the document uses
/// CSS neither renderer supports, or the renderer itself fails (for PDF:
/// characters outside the standard-font repertoire).
pub fn render(html: &str, format: ExportFormat, config: &ExportConfig) -> Result<Vec<u8>, DocRegenError> {
    let start = Instant::now();
    let formatted = formatter::format_document(html, config);
    let laid_out = layout::layout(&formatted, config.style.font_size_pt)
        .map_err(|e| DocRegenError::render(format, e.to_string()))?;

    let bytes = match format {
        ExportFormat::Pdf => pdf::render_pdf(&laid_out, &config.style, config.title.as_deref())?,
        ExportFormat::Docx => docx::render_docx(
            &laid_out,
            &config.style,
            docx::DocxMeta {
                title: config.title.as_deref(),
                author: config.author.as_deref(),
            },
        )?,
    };

    info!(
        "Rendered {} ({} bytes) in {}ms",
        format,
        bytes.len(),
        start.elapsed().as_millis()
    );
    Ok(bytes)
}

/// Render `html` to every format in `formats` concurrently, each on a
/// blocking thread.
///
/// Returns one result per requested format, in request order. One format
/// failing does not affect the others.
pub async fn render_all(
    html: &str,
    formats: &[ExportFormat],
    config: &ExportConfig,
) -> Vec<(ExportFormat, Result<Vec<u8>, DocRegenError>)> {
    let html: Arc<str> = Arc::from(html);
    let config = Arc::new(config.clone());

    let tasks = formats.iter().map(|&format| {
        let html = Arc::clone(&html);
        let config = Arc::clone(&config);
        async move {
            let joined = tokio::task::spawn_blocking(move || render(&html, format, &config)).await;
            let result = joined.unwrap_or_else(|e| {
                Err(DocRegenError::render(format, format!("render task failed: {e}")))
            });
            if let Err(ref e) = result {
                warn!("{}", e);
            }
            (format, result)
        }
    });
    futures::future::join_all(tasks).await
}

/// Render `html` to `format` and write it to `path` atomically.
///
/// Returns the number of bytes written.
pub async fn export_to_file(
    html: &str,
    format: ExportFormat,
    path: impl AsRef<Path>,
    config: &ExportConfig,
) -> Result<usize, DocRegenError> {
    let html = html.to_string();
    let config = config.clone();
    let bytes = tokio::task::spawn_blocking(move || render(&html, format, &config))
        .await
        .map_err(|e| DocRegenError::render(format, format!("render task failed: {e}")))??;
    write_atomic(path.as_ref(), &bytes).await?;
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "<h1>Report</h1><p>Intro</p><table><tr><th>A</th><th>B</th></tr><tr><td>1</td><td>2</td></tr></table>";

    #[test]
    fn renders_both_formats() {
        let config = ExportConfig::default();
        let pdf = render(DOC, ExportFormat::Pdf, &config).unwrap();
        let docx = render(DOC, ExportFormat::Docx, &config).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        assert!(docx.starts_with(b"PK"));
    }

    #[test]
    fn unsupported_css_fails_the_requested_format() {
        let html = "<div style=\"position: absolute\">x</div>";
        for format in [ExportFormat::Pdf, ExportFormat::Docx] {
            let err = render(html, format, &ExportConfig::default()).unwrap_err();
            assert_eq!(err.export_format(), Some(format));
        }
    }

    #[tokio::test]
    async fn render_all_isolates_failures() {
        let html = "<p>Ünïcödé is fine, but 日本語 is not in WinAnsi</p>";
        let results = render_all(html, &[ExportFormat::Pdf, ExportFormat::Docx], &ExportConfig::default()).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, ExportFormat::Pdf);
        assert!(results[0].1.is_err());
        assert!(results[1].1.is_ok());
    }

    #[tokio::test]
    async fn export_to_file_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/report.docx");
        let n = export_to_file(DOC, ExportFormat::Docx, &path, &ExportConfig::default())
            .await
            .unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, n);
    }
}
