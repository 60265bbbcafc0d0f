//! Eager (whole-document) generation entry points.
//!
//! [`Pipeline::run`] parses the document, regenerates every section with at
//! most `concurrency` writer calls in flight, waits for every section to
//! reach a terminal state and assembles the result. Use
//! [`crate::stream::generate_stream`] to receive sections as they finish.
//!
//! Dropping the returned future cancels all in-flight writer calls; nothing
//! is assembled in that case.

use crate::config::PipelineConfig;
use crate::context::{build_context, ContextInput, GenerationContext};
use crate::error::DocRegenError;
use crate::model::{DocumentSection, GeneratedSection, SectionStatus};
use crate::output::{count_status, write_atomic, GenerationResult, GenerationStats, GenerationStatus};
use crate::pipeline::assemble::assemble;
use crate::pipeline::generate::SectionGenerator;
use crate::pipeline::parse::parse_sections;
use crate::pipeline::writer::SectionWriter;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// A configured generation pipeline. The writer is owned by the caller and
/// shared with every section task.
#[derive(Clone)]
pub struct Pipeline {
    writer: Arc<dyn SectionWriter>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(writer: Arc<dyn SectionWriter>, config: PipelineConfig) -> Self {
        Self { writer, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Parse `html`, regenerate each section and assemble the document.
    ///
    /// # Returns
    /// `Ok(GenerationResult)` whenever a document could be assembled, even
    /// if every section fell back to its original HTML.
    ///
    /// # Errors
    /// - [`DocRegenError::Validation`] when the document has more sections
    ///   than `max_sections`
    /// - [`DocRegenError::Assembly`] when the assembled document is not
    ///   well-formed
    pub async fn run(
        &self,
        html: &str,
        context: &GenerationContext,
    ) -> Result<GenerationResult, DocRegenError> {
        let total_start = Instant::now();
        let sections = parse_sections(html);
        self.run_sections(&sections, context, total_start).await
    }

    /// Same as [`run`](Self::run) for already-parsed sections.
    pub async fn run_parsed(
        &self,
        sections: &[DocumentSection],
        context: &GenerationContext,
    ) -> Result<GenerationResult, DocRegenError> {
        self.run_sections(sections, context, Instant::now()).await
    }

    async fn run_sections(
        &self,
        sections: &[DocumentSection],
        context: &GenerationContext,
        total_start: Instant,
    ) -> Result<GenerationResult, DocRegenError> {
        check_section_limit(sections.len(), &self.config)?;
        let total = sections.len();
        info!("Generating {} sections (concurrency {})", total, self.config.concurrency);

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_generation_start(total);
        }

        // ── Generate ─────────────────────────────────────────────────────
        let generation_start = Instant::now();
        let mut generated = self.generate_all(sections, context).await;
        let generation_duration_ms = generation_start.elapsed().as_millis() as u64;
        generated.sort_by_key(|g| g.order_index);

        let succeeded = count_status(&generated, SectionStatus::Success);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_generation_complete(total, succeeded);
        }

        // ── Assemble ─────────────────────────────────────────────────────
        let final_html = assemble(&generated)?;

        let failed = total - succeeded;
        let errors: Vec<String> = generated
            .iter()
            .filter_map(|g| g.failure.as_ref().map(|f| f.to_string()))
            .collect();
        if failed > 0 {
            warn!("{}/{} sections fell back to their original content", failed, total);
        }

        let stats = GenerationStats {
            total_sections: total,
            succeeded_sections: succeeded,
            fallback_sections: failed,
            total_attempts: generated.iter().map(|g| g.attempt_count as u64).sum(),
            retried_sections: generated.iter().filter(|g| g.attempt_count > 1).count(),
            total_duration_ms: total_start.elapsed().as_millis() as u64,
            generation_duration_ms,
        };

        info!(
            "Generation complete: {}/{} sections regenerated, {}ms total",
            succeeded, total, stats.total_duration_ms
        );

        Ok(GenerationResult {
            sections: generated,
            sections_processed: total,
            sections_failed: failed,
            final_html,
            errors,
            success: true,
            status: GenerationStatus::from_counts(total, failed),
            stats,
        })
    }

    /// Regenerate every section, at most `concurrency` at a time, under the
    /// generation-phase deadline. Results arrive in completion order.
    async fn generate_all(
        &self,
        sections: &[DocumentSection],
        context: &GenerationContext,
    ) -> Vec<GeneratedSection> {
        let total = sections.len();
        let deadline = tokio::time::Instant::now() + self.config.generation_timeout;
        let generator = SectionGenerator::new(Arc::clone(&self.writer), &self.config);

        stream::iter(sections.iter().map(|section| {
            let generator = generator.clone();
            let cb = self.config.progress_callback.clone();
            async move {
                if let Some(ref cb) = cb {
                    cb.on_section_start(section.order_index, total);
                }
                let result = generator.generate_until(section, context, deadline).await;
                if let Some(ref cb) = cb {
                    report(cb.as_ref(), &result, total);
                }
                result
            }
        }))
        .buffer_unordered(self.config.concurrency)
        .collect()
        .await
    }
}

pub(crate) fn report(
    cb: &dyn crate::progress::GenerationProgressCallback,
    result: &GeneratedSection,
    total: usize,
) {
    match &result.failure {
        None => cb.on_section_complete(result.order_index, total, result.generated_html.len()),
        Some(f) => cb.on_section_fallback(result.order_index, total, &f.to_string()),
    }
}

pub(crate) fn check_section_limit(count: usize, config: &PipelineConfig) -> Result<(), DocRegenError> {
    if count > config.max_sections {
        return Err(DocRegenError::validation(
            "html",
            format!(
                "document has {count} sections, more than the limit of {}",
                config.max_sections
            ),
        ));
    }
    Ok(())
}

/// Regenerate `html` with `writer`. See [`Pipeline::run`].
pub async fn generate_document(
    html: &str,
    context: &GenerationContext,
    writer: Arc<dyn SectionWriter>,
    config: &PipelineConfig,
) -> Result<GenerationResult, DocRegenError> {
    Pipeline::new(writer, config.clone()).run(html, context).await
}

/// Validate raw caller input, then regenerate `html`.
///
/// Fails with [`DocRegenError::Validation`] before any writer call when the
/// input is incomplete.
pub async fn generate_from_input(
    html: &str,
    input: ContextInput,
    writer: Arc<dyn SectionWriter>,
    config: &PipelineConfig,
) -> Result<GenerationResult, DocRegenError> {
    let context = build_context(input)?;
    generate_document(html, &context, writer, config).await
}

/// Regenerate `html` and write the final HTML to `output_path` atomically.
pub async fn generate_to_file(
    html: &str,
    output_path: impl AsRef<Path>,
    context: &GenerationContext,
    writer: Arc<dyn SectionWriter>,
    config: &PipelineConfig,
) -> Result<GenerationStats, DocRegenError> {
    let result = generate_document(html, context, writer, config).await?;
    write_atomic(output_path.as_ref(), result.final_html.as_bytes()).await?;
    Ok(result.stats)
}

/// Synchronous wrapper around [`generate_document`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_document_sync(
    html: &str,
    context: &GenerationContext,
    writer: Arc<dyn SectionWriter>,
    config: &PipelineConfig,
) -> Result<GenerationResult, DocRegenError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocRegenError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate_document(html, context, writer, config))
}
