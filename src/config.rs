//! Configuration types for section regeneration and export.
//!
//! * [`PipelineConfig`] controls the generation phase: concurrency, the
//!   retry/fallback policy and timeouts.
//! * [`ExportConfig`] controls the Export Reconciler: the shared
//!   [`StyleSheet`], document title and cover page.
//! * [`LlmWriterConfig`] configures the LLM-backed section writer.
//!
//! Each is built through a builder whose setters clamp obviously invalid
//! values and whose `build()` validates the rest.

use crate::error::DocRegenError;
use crate::export::style::{Rgb, StyleSheet};
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// ── Pipeline ─────────────────────────────────────────────────────────────

/// Configuration of the generation phase.
///
/// # Example
/// ```rust
/// use edgequake_docregen::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .concurrency(8)
///     .max_attempts(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Concurrent writer calls. Default: 4.
    pub concurrency: usize,

    /// Writer calls per section before falling back. Default: 2.
    pub max_attempts: u32,

    /// Initial delay between attempts; doubles after each retry. Default: 500 ms.
    pub retry_backoff_ms: u64,

    /// Timeout of a single writer call. Default: 60 s.
    pub attempt_timeout: Duration,

    /// Timeout of the whole generation phase. Sections still running when it
    /// expires fall back to their original HTML. Default: 300 s.
    pub generation_timeout: Duration,

    /// Documents with more sections are rejected before any writer call.
    /// Default: 50.
    pub max_sections: usize,

    /// Optional per-section progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_attempts: 2,
            retry_backoff_ms: 500,
            attempt_timeout: Duration::from_secs(60),
            generation_timeout: Duration::from_secs(300),
            max_sections: 50,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("concurrency", &self.concurrency)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("generation_timeout", &self.generation_timeout)
            .field("max_sections", &self.max_sections)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn GenerationProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Delay before attempt `attempt` (1-based); zero before the first.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u64.saturating_pow(attempt - 2);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.clamp(1, 10);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.attempt_timeout = timeout;
        self
    }

    pub fn attempt_timeout_secs(self, secs: u64) -> Self {
        self.attempt_timeout(Duration::from_secs(secs))
    }

    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.config.generation_timeout = timeout;
        self
    }

    pub fn generation_timeout_secs(self, secs: u64) -> Self {
        self.generation_timeout(Duration::from_secs(secs))
    }

    pub fn max_sections(mut self, n: usize) -> Self {
        self.config.max_sections = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DocRegenError> {
        let c = &self.config;
        if c.attempt_timeout.is_zero() {
            return Err(DocRegenError::InvalidConfig(
                "attempt timeout must be greater than zero".into(),
            ));
        }
        if c.generation_timeout.is_zero() {
            return Err(DocRegenError::InvalidConfig(
                "generation timeout must be greater than zero".into(),
            ));
        }
        if c.concurrency == 0 || c.max_attempts == 0 {
            return Err(DocRegenError::InvalidConfig(
                "concurrency and max attempts must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Export ───────────────────────────────────────────────────────────────

/// Cover page generated in front of the exported document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverPageMode {
    /// No cover page (default).
    #[default]
    None,
    /// Title, one metadata line and a rule, followed directly by the body.
    Minimal,
    /// Title and one line per metadata field on a page of its own.
    Full,
}

impl std::str::FromStr for CoverPageMode {
    type Err = DocRegenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(CoverPageMode::None),
            "minimal" => Ok(CoverPageMode::Minimal),
            "full" => Ok(CoverPageMode::Full),
            other => Err(DocRegenError::InvalidConfig(format!(
                "unknown cover page mode '{other}' (expected none, minimal or full)"
            ))),
        }
    }
}

/// Configuration of the Export Reconciler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Style mapping applied identically to every format.
    pub style: StyleSheet,
    /// Document title; used for the cover page, duplicate-title removal and
    /// document properties.
    pub title: Option<String>,
    pub cover_page: CoverPageMode,
    pub author: Option<String>,
    pub organization: Option<String>,
    /// Free-form date string shown on the cover page.
    pub date: Option<String>,
}

impl ExportConfig {
    pub fn builder() -> ExportConfigBuilder {
        ExportConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExportConfig`].
#[derive(Debug)]
pub struct ExportConfigBuilder {
    config: ExportConfig,
}

impl ExportConfigBuilder {
    pub fn style(mut self, style: StyleSheet) -> Self {
        self.config.style = style;
        self
    }

    pub fn font_family(mut self, family: impl Into<String>) -> Self {
        self.config.style.font_family = family.into();
        self
    }

    pub fn font_size_pt(mut self, size: f32) -> Self {
        self.config.style.font_size_pt = size;
        self
    }

    pub fn margin_mm(mut self, mm: f32) -> Self {
        self.config.style.margin_mm = mm;
        self
    }

    pub fn table_border_color(mut self, color: Rgb) -> Self {
        self.config.style.table_border_color = color;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn cover_page(mut self, mode: CoverPageMode) -> Self {
        self.config.cover_page = mode;
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.config.author = Some(author.into());
        self
    }

    pub fn organization(mut self, org: impl Into<String>) -> Self {
        self.config.organization = Some(org.into());
        self
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.config.date = Some(date.into());
        self
    }

    pub fn build(self) -> Result<ExportConfig, DocRegenError> {
        self.config.style.validate()?;
        if self.config.cover_page != CoverPageMode::None
            && self.config.title.as_deref().map_or(true, |t| t.trim().is_empty())
        {
            return Err(DocRegenError::InvalidConfig(
                "a cover page requires a document title".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── LLM writer ───────────────────────────────────────────────────────────

/// Configuration of [`crate::pipeline::llm::LlmSectionWriter`].
#[derive(Clone)]
pub struct LlmWriterConfig {
    /// Model identifier, e.g. "gpt-4.1-mini". Provider default when `None`.
    pub model: Option<String>,
    /// Provider name ("openai", "anthropic", "ollama", …).
    pub provider_name: Option<String>,
    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,
    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,
    /// Maximum tokens generated per section. Default: 4096.
    pub max_tokens: usize,
    /// Replaces the built-in system prompt.
    pub system_prompt: Option<String>,
}

impl Default for LlmWriterConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 4096,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for LlmWriterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmWriterConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .finish()
    }
}

impl LlmWriterConfig {
    pub fn builder() -> LlmWriterConfigBuilder {
        LlmWriterConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`LlmWriterConfig`].
#[derive(Debug)]
pub struct LlmWriterConfigBuilder {
    config: LlmWriterConfig,
}

impl LlmWriterConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn build(self) -> Result<LlmWriterConfig, DocRegenError> {
        if self.config.max_tokens < 256 {
            return Err(DocRegenError::InvalidConfig(format!(
                "max tokens must be ≥ 256, got {}",
                self.config.max_tokens
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.concurrency, 4);
        assert_eq!(c.max_attempts, 2);
        assert_eq!(c.max_sections, 50);
        assert_eq!(c.attempt_timeout, Duration::from_secs(60));
    }

    #[test]
    fn builder_clamps() {
        let c = PipelineConfig::builder()
            .concurrency(0)
            .max_attempts(0)
            .max_sections(0)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_attempts, 1);
        assert_eq!(c.max_sections, 1);

        let c = PipelineConfig::builder().max_attempts(99).build().unwrap();
        assert_eq!(c.max_attempts, 10);
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let err = PipelineConfig::builder()
            .attempt_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, DocRegenError::InvalidConfig(_)));
        assert!(PipelineConfig::builder().generation_timeout_secs(0).build().is_err());
    }

    #[test]
    fn backoff_doubles() {
        let c = PipelineConfig::builder().retry_backoff_ms(100).build().unwrap();
        assert_eq!(c.backoff_before(1), Duration::ZERO);
        assert_eq!(c.backoff_before(2), Duration::from_millis(100));
        assert_eq!(c.backoff_before(3), Duration::from_millis(200));
        assert_eq!(c.backoff_before(4), Duration::from_millis(400));
    }

    #[test]
    fn cover_page_requires_title() {
        assert!(ExportConfig::builder().cover_page(CoverPageMode::Full).build().is_err());
        let c = ExportConfig::builder()
            .cover_page(CoverPageMode::Full)
            .title("Report")
            .build()
            .unwrap();
        assert_eq!(c.title.as_deref(), Some("Report"));
    }

    #[test]
    fn export_builder_validates_style() {
        assert!(ExportConfig::builder().font_size_pt(200.0).build().is_err());
        let c = ExportConfig::builder().font_family("Georgia").build().unwrap();
        assert_eq!(c.style.font_family, "Georgia");
    }

    #[test]
    fn cover_mode_parses() {
        assert_eq!("FULL".parse::<CoverPageMode>().unwrap(), CoverPageMode::Full);
        assert!("fancy".parse::<CoverPageMode>().is_err());
    }

    #[test]
    fn llm_writer_defaults() {
        let c = LlmWriterConfig::default();
        assert_eq!(c.temperature, 0.2);
        assert_eq!(c.max_tokens, 4096);
        let c = LlmWriterConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
        assert!(LlmWriterConfig::builder().max_tokens(10).build().is_err());
    }
}
