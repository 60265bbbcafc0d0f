//! Pipeline stages for section-based document regeneration.
//!
//! Each submodule implements exactly one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! parse ──▶ generate ──────────────────────────────▶ assemble
//! (HTML)    (writer ─▶ postprocess ─▶ validate)×N    (final HTML)
//! ```
//!
//! 1. [`parse`]       — split HTML into ordered sections with hierarchy
//! 2. [`writer`]      — the content-generation collaborator trait
//! 3. [`llm`]         — the `edgequake-llm` writer; the only stage with
//!    network I/O
//! 4. [`postprocess`] — deterministic fixes for LLM output quirks
//! 5. [`validate`]    — accept or reject one attempt's output
//! 6. [`generate`]    — per-section retry/fallback state machine
//! 7. [`assemble`]    — ordered, validated reassembly

pub mod assemble;
pub mod generate;
pub mod llm;
pub mod parse;
pub mod postprocess;
pub mod validate;
pub mod writer;
