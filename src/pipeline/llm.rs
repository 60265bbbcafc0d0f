//! LLM-backed [`SectionWriter`]: one chat completion per section attempt.
//!
//! Retry, timeout and validation live in the generator; this module only
//! builds the messages, makes one call and classifies its failure. Prompt
//! wording lives in [`crate::prompts`].

use crate::config::LlmWriterConfig;
use crate::context::GenerationContext;
use crate::error::DocRegenError;
use crate::model::DocumentSection;
use crate::pipeline::writer::{SectionWriter, WriterError};
use crate::prompts::{section_prompt, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage, CompletionOptions, LLMProvider, LlmError, ProviderFactory, RetryStrategy,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Regenerates sections through an `edgequake-llm` provider.
pub struct LlmSectionWriter {
    provider: Arc<dyn LLMProvider>,
    config: LlmWriterConfig,
}

impl LlmSectionWriter {
    pub fn new(provider: Arc<dyn LLMProvider>, config: LlmWriterConfig) -> Self {
        Self { provider, config }
    }

    /// Resolve the provider from `config` and the environment.
    pub fn from_config(config: LlmWriterConfig) -> Result<Self, DocRegenError> {
        let provider = resolve_provider(&config)?;
        Ok(Self::new(provider, config))
    }

    fn messages(&self, section: &DocumentSection, context: &GenerationContext) -> Vec<ChatMessage> {
        let system = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        vec![
            ChatMessage::system(system),
            ChatMessage::user(section_prompt(section, context)),
        ]
    }
}

#[async_trait]
impl SectionWriter for LlmSectionWriter {
    async fn write_section(
        &self,
        section: &DocumentSection,
        context: &GenerationContext,
    ) -> Result<String, WriterError> {
        let start = Instant::now();
        let messages = self.messages(section, context);
        let options = build_options(&self.config);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(classify)?;

        debug!(
            "Section {}: {} input tokens, {} output tokens, {:?}",
            section.id,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(WriterError::Transient("empty response from provider".into()));
        }
        Ok(response.content)
    }
}

fn build_options(config: &LlmWriterConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Errors the provider marks as not retryable, and prompts too large for
/// the model, fail the section at once. Everything else is retried.
fn classify(err: LlmError) -> WriterError {
    let message = err.to_string();
    match err.retry_strategy() {
        RetryStrategy::NoRetry | RetryStrategy::ReduceContext => WriterError::Permanent(message),
        _ => WriterError::Transient(message),
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DocRegenError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocRegenError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. a pre-built provider in `config.provider`
/// 2. `config.provider_name` with `config.model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. OpenAI when `OPENAI_API_KEY` is set
/// 5. `ProviderFactory::from_env()` auto-detection
pub fn resolve_provider(config: &LlmWriterConfig) -> Result<Arc<dyn LLMProvider>, DocRegenError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DocRegenError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
