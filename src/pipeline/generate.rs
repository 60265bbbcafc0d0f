//! Section Generator: one section, bounded attempts, guaranteed outcome.
//!
//! Each section runs through a small explicit state machine:
//!
//! ```text
//! Pending ──▶ Generating(1) ──ok──▶ Succeeded
//!                 │
//!                 ├─err, attempts left──▶ Retry ──▶ Generating(n+1)
//!                 └─err, exhausted or permanent──▶ FallenBack
//! ```
//!
//! An attempt fails when the writer errors, exceeds the per-call timeout, or
//! returns output that does not survive [`postprocess`] + [`validate_output`].
//! Every retry is a fresh writer call. `FallenBack` restores the original
//! HTML, so [`SectionGenerator::generate`] never fails.

use crate::config::PipelineConfig;
use crate::context::GenerationContext;
use crate::error::SectionGenerationFailure;
use crate::html;
use crate::model::{DocumentSection, GeneratedSection, SectionStatus};
use crate::pipeline::postprocess;
use crate::pipeline::validate::{validate_output, OutputIssue};
use crate::pipeline::writer::{SectionWriter, WriterError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, timeout_at};
use tracing::{debug, info, warn};

/// Why one attempt was discarded.
#[derive(Debug, Clone, PartialEq)]
enum AttemptError {
    Writer(WriterError),
    Invalid(OutputIssue),
    TimedOut,
}

impl AttemptError {
    fn is_permanent(&self) -> bool {
        matches!(self, AttemptError::Writer(e) if e.is_permanent())
    }
}

#[derive(Debug)]
enum State {
    Pending,
    Generating { attempt: u32 },
    Retry { attempt: u32, error: AttemptError },
    Succeeded { html: String },
    FallenBack { failure: SectionGenerationFailure },
}

/// Terminal states only.
#[derive(Debug)]
enum Outcome {
    Succeeded(String),
    FallenBack(SectionGenerationFailure),
}

/// Regenerates single sections with retry and fallback.
#[derive(Clone)]
pub struct SectionGenerator {
    writer: Arc<dyn SectionWriter>,
    config: PipelineConfig,
}

impl SectionGenerator {
    pub fn new(writer: Arc<dyn SectionWriter>, config: &PipelineConfig) -> Self {
        Self {
            writer,
            config: config.clone(),
        }
    }

    /// Regenerate `section`. Always returns a terminal record.
    pub async fn generate(
        &self,
        section: &DocumentSection,
        context: &GenerationContext,
    ) -> GeneratedSection {
        self.run(section, context, None).await
    }

    /// Like [`generate`](Self::generate), but falls back with
    /// [`SectionGenerationFailure::PhaseTimeout`] once `deadline` passes,
    /// dropping any in-flight writer call.
    pub async fn generate_until(
        &self,
        section: &DocumentSection,
        context: &GenerationContext,
        deadline: tokio::time::Instant,
    ) -> GeneratedSection {
        self.run(section, context, Some(deadline)).await
    }

    async fn run(
        &self,
        section: &DocumentSection,
        context: &GenerationContext,
        deadline: Option<tokio::time::Instant>,
    ) -> GeneratedSection {
        let start = Instant::now();
        let attempts = AtomicU32::new(0);

        let outcome = match deadline {
            Some(d) if d <= tokio::time::Instant::now() => self.phase_timeout(section),
            Some(d) => match timeout_at(d, self.drive(section, context, &attempts)).await {
                Ok(outcome) => outcome,
                Err(_) => self.phase_timeout(section),
            },
            None => self.drive(section, context, &attempts).await,
        };

        finish(
            section,
            outcome,
            attempts.load(Ordering::SeqCst),
            start.elapsed().as_millis() as u64,
        )
    }

    fn phase_timeout(&self, section: &DocumentSection) -> Outcome {
        warn!("Section {}: generation phase deadline reached", section.id);
        Outcome::FallenBack(SectionGenerationFailure::PhaseTimeout {
            section_id: section.id.clone(),
            timeout_ms: self.config.generation_timeout.as_millis() as u64,
        })
    }

    /// Run the state machine until a terminal state.
    async fn drive(
        &self,
        section: &DocumentSection,
        context: &GenerationContext,
        attempts: &AtomicU32,
    ) -> Outcome {
        let max = self.config.max_attempts;
        let mut state = State::Pending;
        loop {
            state = match state {
                State::Pending => State::Generating { attempt: 1 },
                State::Generating { attempt } => {
                    let backoff = self.config.backoff_before(attempt);
                    if !backoff.is_zero() {
                        sleep(backoff).await;
                    }
                    attempts.store(attempt, Ordering::SeqCst);
                    match self.attempt(section, context).await {
                        Ok(html) => State::Succeeded { html },
                        Err(error) if attempt >= max || error.is_permanent() => State::FallenBack {
                            failure: to_failure(&section.id, attempt, error, &self.config),
                        },
                        Err(error) => State::Retry { attempt, error },
                    }
                }
                State::Retry { attempt, error } => {
                    warn!(
                        "Section {}: attempt {}/{} failed ({:?}), retrying",
                        section.id, attempt, max, error
                    );
                    State::Generating {
                        attempt: attempt + 1,
                    }
                }
                State::Succeeded { html } => return Outcome::Succeeded(html),
                State::FallenBack { failure } => return Outcome::FallenBack(failure),
            };
        }
    }

    /// One fresh writer call, cleaned and validated.
    async fn attempt(
        &self,
        section: &DocumentSection,
        context: &GenerationContext,
    ) -> Result<String, AttemptError> {
        let call = self.writer.write_section(section, context);
        let raw = match timeout(self.config.attempt_timeout, call).await {
            Err(_) => return Err(AttemptError::TimedOut),
            Ok(Err(e)) => return Err(AttemptError::Writer(e)),
            Ok(Ok(raw)) => raw,
        };

        let cleaned = postprocess::clean_html(&raw);
        let cleaned = postprocess::relevel_leading_heading(&cleaned, section.metadata.level);
        validate_output(section, &cleaned).map_err(AttemptError::Invalid)?;
        debug!("Section {}: accepted {} bytes", section.id, cleaned.len());
        Ok(cleaned)
    }
}

fn to_failure(
    section_id: &str,
    attempts: u32,
    error: AttemptError,
    config: &PipelineConfig,
) -> SectionGenerationFailure {
    let section_id = section_id.to_string();
    match error {
        AttemptError::Writer(e) => SectionGenerationFailure::WriterFailed {
            section_id,
            attempts,
            detail: e.to_string(),
        },
        AttemptError::Invalid(issue) => SectionGenerationFailure::InvalidOutput {
            section_id,
            attempts,
            detail: issue.to_string(),
        },
        AttemptError::TimedOut => SectionGenerationFailure::AttemptTimeout {
            section_id,
            timeout_ms: config.attempt_timeout.as_millis() as u64,
        },
    }
}

fn finish(
    section: &DocumentSection,
    outcome: Outcome,
    attempt_count: u32,
    duration_ms: u64,
) -> GeneratedSection {
    let mut record = GeneratedSection::pending(section);
    record.attempt_count = attempt_count;
    record.duration_ms = duration_ms;

    match outcome {
        Outcome::Succeeded(html) => {
            record.generated_html = html;
            record.status = SectionStatus::Success;
        }
        Outcome::FallenBack(failure) => {
            info!("Section {}: falling back to original ({})", section.id, failure);
            record.generated_html = section.html_content.clone();
            record.status = match html::check_well_formed(&section.html_content) {
                Ok(()) => SectionStatus::FailedFallback,
                Err(_) => SectionStatus::FailedUnrecoverable,
            };
            record.failure = Some(failure);
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{build_context, ContextInput};
    use crate::pipeline::parse::parse_sections;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Scripted {
        replies: Vec<Result<String, WriterError>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, WriterError>>) -> Arc<Self> {
            Arc::new(Self {
                replies,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SectionWriter for Scripted {
        async fn write_section(
            &self,
            _section: &DocumentSection,
            _context: &GenerationContext,
        ) -> Result<String, WriterError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .get(n)
                .cloned()
                .unwrap_or_else(|| Err(WriterError::Transient("script exhausted".into())))
        }
    }

    struct Sleepy(Duration);

    #[async_trait]
    impl SectionWriter for Sleepy {
        async fn write_section(
            &self,
            section: &DocumentSection,
            _context: &GenerationContext,
        ) -> Result<String, WriterError> {
            sleep(self.0).await;
            Ok(section.html_content.clone())
        }
    }

    fn config(max_attempts: u32) -> PipelineConfig {
        PipelineConfig::builder()
            .max_attempts(max_attempts)
            .retry_backoff_ms(0)
            .build()
            .unwrap()
    }

    fn fixture() -> (DocumentSection, GenerationContext) {
        let section = parse_sections("<h2>Stack</h2><table><tr><td>Django</td></tr></table>").remove(0);
        let ctx = build_context(ContextInput::new("FinStack", "Payments")).unwrap();
        (section, ctx)
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let (section, ctx) = fixture();
        let writer = Scripted::new(vec![Ok(
            "```html\n<h2>Stack</h2><table><tr><td>Next.js</td></tr></table>\n```".into(),
        )]);
        let g = SectionGenerator::new(writer.clone(), &config(2)).generate(&section, &ctx).await;
        assert_eq!(g.status, SectionStatus::Success);
        assert_eq!(g.attempt_count, 1);
        assert!(g.generated_html.contains("Next.js"));
        assert!(!g.generated_html.contains("```"));
        assert_eq!(g.original_html, section.html_content);
    }

    #[tokio::test]
    async fn invalid_output_is_retried() {
        let (section, ctx) = fixture();
        let writer = Scripted::new(vec![
            Ok("<h2>Stack</h2><p>no table</p>".into()),
            Ok("<h2>Stack</h2><table><tr><td>Rust</td></tr></table>".into()),
        ]);
        let g = SectionGenerator::new(writer.clone(), &config(2)).generate(&section, &ctx).await;
        assert_eq!(g.status, SectionStatus::Success);
        assert_eq!(g.attempt_count, 2);
        assert_eq!(writer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_attempts_fall_back() {
        let (section, ctx) = fixture();
        let writer = Scripted::new(vec![]);
        let g = SectionGenerator::new(writer.clone(), &config(3)).generate(&section, &ctx).await;
        assert_eq!(g.status, SectionStatus::FailedFallback);
        assert_eq!(g.generated_html, g.original_html);
        assert_eq!(g.attempt_count, 3);
        assert_eq!(writer.calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            g.failure,
            Some(SectionGenerationFailure::WriterFailed { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn permanent_error_stops_retrying() {
        let (section, ctx) = fixture();
        let writer = Scripted::new(vec![Err(WriterError::Permanent("401".into()))]);
        let g = SectionGenerator::new(writer.clone(), &config(5)).generate(&section, &ctx).await;
        assert_eq!(g.status, SectionStatus::FailedFallback);
        assert_eq!(writer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn leading_heading_is_relevelled() {
        let (section, ctx) = fixture();
        let writer = Scripted::new(vec![Ok(
            "# Stack\n<table><tr><td>Go</td></tr></table>".into(),
        )]);
        let g = SectionGenerator::new(writer, &config(1)).generate(&section, &ctx).await;
        assert_eq!(g.status, SectionStatus::Success);
        assert!(g.generated_html.starts_with("<h2>Stack</h2>"), "{}", g.generated_html);
    }

    #[tokio::test]
    async fn slow_writer_times_out_per_attempt() {
        let (section, ctx) = fixture();
        let cfg = PipelineConfig::builder()
            .max_attempts(2)
            .retry_backoff_ms(0)
            .attempt_timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let g = SectionGenerator::new(Arc::new(Sleepy(Duration::from_secs(5))), &cfg)
            .generate(&section, &ctx)
            .await;
        assert_eq!(g.status, SectionStatus::FailedFallback);
        assert!(matches!(
            g.failure,
            Some(SectionGenerationFailure::AttemptTimeout { timeout_ms: 20, .. })
        ));
    }

    #[tokio::test]
    async fn expired_deadline_falls_back_without_calling() {
        let (section, ctx) = fixture();
        let writer = Scripted::new(vec![]);
        let deadline = tokio::time::Instant::now() - Duration::from_millis(1);
        let g = SectionGenerator::new(writer.clone(), &config(2))
            .generate_until(&section, &ctx, deadline)
            .await;
        assert_eq!(g.status, SectionStatus::FailedFallback);
        assert_eq!(g.attempt_count, 0);
        assert_eq!(writer.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(g.failure, Some(SectionGenerationFailure::PhaseTimeout { .. })));
    }

    #[tokio::test]
    async fn deadline_cancels_in_flight_call() {
        let (section, ctx) = fixture();
        let deadline = tokio::time::Instant::now() + Duration::from_millis(30);
        let g = SectionGenerator::new(Arc::new(Sleepy(Duration::from_secs(5))), &config(1))
            .generate_until(&section, &ctx, deadline)
            .await;
        assert_eq!(g.status, SectionStatus::FailedFallback);
        assert_eq!(g.attempt_count, 1);
        assert!(g.duration_ms < 5_000);
    }
}
