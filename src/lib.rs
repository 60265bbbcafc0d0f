//! # edgequake-docregen
//!
//! Regenerate an HTML document section by section with an LLM, keeping its
//! structure, then export it to PDF and DOCX with identical styling.
//!
//! ## Why this crate?
//!
//! Asking a model to rewrite a whole reference document in one call loses
//! tables, reorders headings and fails all-or-nothing. This crate splits the
//! document at its headings, regenerates every section independently with
//! bounded concurrency, validates each answer against the original
//! section's structure and falls back to the original content when a
//! section cannot be regenerated. A document is always produced.
//!
//! ## Pipeline Overview
//!
//! ```text
//! HTML
//!  │
//!  ├─ 1. Parse     split at top-level headings into ordered sections
//!  ├─ 2. Context   validate project name/description/prompt, extract JSON overrides
//!  ├─ 3. Generate  concurrent writer calls, retry, validate, fall back
//!  ├─ 4. Assemble  join sections in document order, check well-formedness
//!  └─ 5. Export    PDF and DOCX from one shared style mapping
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docregen::{
//!     build_context, generate_document, render, ContextInput, ExportConfig, ExportFormat,
//!     LlmSectionWriter, LlmWriterConfig, PipelineConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let html = std::fs::read_to_string("reference.html")?;
//!     let ctx = build_context(
//!         ContextInput::new("FinStack", "A payments platform for small banks")
//!             .prompt("Formal tone. {\"region\": \"EU\"}"),
//!     )?;
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let writer = Arc::new(LlmSectionWriter::from_config(LlmWriterConfig::default())?);
//!     let result = generate_document(&html, &ctx, writer, &PipelineConfig::default()).await?;
//!     eprintln!("{}/{} sections regenerated", result.sections_processed - result.sections_failed, result.sections_processed);
//!
//!     let pdf = render(&result.final_html, ExportFormat::Pdf, &ExportConfig::default())?;
//!     std::fs::write("out.pdf", pdf)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docregen` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docregen = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod generate;
pub mod html;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CoverPageMode, ExportConfig, ExportConfigBuilder, LlmWriterConfig, LlmWriterConfigBuilder,
    PipelineConfig, PipelineConfigBuilder,
};
pub use context::{
    build_context, extract_trailing_json, ContextBuilder, ContextInput, GenerationContext,
    VarValue, Vars,
};
pub use error::{DocRegenError, ExportFormat, SectionGenerationFailure};
pub use export::style::{Rgb, StyleSheet};
pub use export::{export_to_file, render, render_all};
pub use generate::{
    generate_document, generate_document_sync, generate_from_input, generate_to_file, Pipeline,
};
pub use model::{
    DocumentSection, GeneratedSection, SectionMetadata, SectionStatus, SectionType,
};
pub use output::{GenerationResult, GenerationStats, GenerationStatus};
pub use pipeline::assemble::{assemble, reassemble};
pub use pipeline::llm::LlmSectionWriter;
pub use pipeline::parse::{parse_bytes, parse_sections};
pub use pipeline::writer::{IdentityWriter, SectionWriter, WriterError};
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{generate_stream, SectionStream};
