//! Streaming generation API: emit sections as they complete.
//!
//! Unlike [`crate::generate::generate_document`], which returns only after
//! every section is terminal and the document is assembled,
//! [`generate_stream`] yields each [`GeneratedSection`] as soon as it
//! finishes. Sections arrive in completion order; sort by `order_index` and
//! pass them to [`crate::pipeline::assemble::assemble`] to build the document.

use crate::config::PipelineConfig;
use crate::context::GenerationContext;
use crate::error::DocRegenError;
use crate::generate::{check_section_limit, report};
use crate::model::GeneratedSection;
use crate::pipeline::generate::SectionGenerator;
use crate::pipeline::parse::parse_sections;
use crate::pipeline::writer::SectionWriter;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of terminal section records.
pub type SectionStream = Pin<Box<dyn Stream<Item = GeneratedSection> + Send>>;

/// Parse `html` and stream regenerated sections as they finish.
///
/// The generation-phase deadline starts when this function is called. Every
/// item is terminal: failed sections arrive as fallbacks, never as errors.
///
/// # Errors
/// [`DocRegenError::Validation`] when the document exceeds `max_sections`.
///
/// # Example
/// ```rust,no_run
/// use edgequake_docregen::{build_context, generate_stream, ContextInput, IdentityWriter, PipelineConfig};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ctx = build_context(ContextInput::new("FinStack", "Payments platform"))?;
/// let mut stream = generate_stream("<h1>A</h1><p>x</p>", &ctx, Arc::new(IdentityWriter), &PipelineConfig::default())?;
/// while let Some(section) = stream.next().await {
///     println!("{} → {}", section.section_id, section.status);
/// }
/// # Ok(())
/// # }
/// ```
pub fn generate_stream(
    html: &str,
    context: &GenerationContext,
    writer: Arc<dyn SectionWriter>,
    config: &PipelineConfig,
) -> Result<SectionStream, DocRegenError> {
    let sections = parse_sections(html);
    check_section_limit(sections.len(), config)?;

    let total = sections.len();
    info!("Streaming generation of {} sections", total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_generation_start(total);
    }

    let deadline = tokio::time::Instant::now() + config.generation_timeout;
    let generator = SectionGenerator::new(writer, config);
    let context = Arc::new(context.clone());
    let callback = config.progress_callback.clone();

    let s = stream::iter(sections.into_iter().map(move |section| {
        let generator = generator.clone();
        let context = Arc::clone(&context);
        let cb = callback.clone();
        async move {
            if let Some(ref cb) = cb {
                cb.on_section_start(section.order_index, total);
            }
            let result = generator.generate_until(&section, &context, deadline).await;
            if let Some(ref cb) = cb {
                report(cb.as_ref(), &result, total);
            }
            result
        }
    }))
    .buffer_unordered(config.concurrency);

    Ok(Box::pin(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{build_context, ContextInput};
    use crate::model::SectionStatus;
    use crate::pipeline::assemble::assemble;
    use crate::pipeline::writer::IdentityWriter;

    #[tokio::test]
    async fn stream_yields_every_section() {
        let ctx = build_context(ContextInput::new("P", "D")).unwrap();
        let html = "<h1>A</h1><p>a</p><h2>B</h2><p>b</p><h1>C</h1><p>c</p>";
        let stream = generate_stream(html, &ctx, Arc::new(IdentityWriter), &PipelineConfig::default()).unwrap();
        let mut sections: Vec<GeneratedSection> = stream.collect().await;
        assert_eq!(sections.len(), 3);
        assert!(sections.iter().all(|s| s.status == SectionStatus::Success));

        sections.sort_by_key(|s| s.order_index);
        let doc = assemble(&sections).unwrap();
        assert!(doc.starts_with("<h1>A</h1>"));
    }

    #[test]
    fn section_limit_applies() {
        let ctx = build_context(ContextInput::new("P", "D")).unwrap();
        let config = PipelineConfig::builder().max_sections(1).build().unwrap();
        let result = generate_stream("<h1>A</h1><h1>B</h1>", &ctx, Arc::new(IdentityWriter), &config);
        assert!(result.is_err());
    }
}
