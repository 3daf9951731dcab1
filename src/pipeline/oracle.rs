//! The extraction oracle: a vision model asked to read metrics off pages.
//!
//! The oracle is best-effort. It may return a partial object, a wrong value,
//! or fail outright; the scan loop in [`crate::extract`] absorbs all of
//! that. This module only builds the request and parses the reply. There is
//! no retry here: a failed call costs the document one attempt and the next
//! attempt moves on to fresh pages.

use crate::config::ExtractionConfig;
use crate::error::{EsgError, OracleError};
use crate::pipeline::merge::RequiredField;
use crate::pipeline::parse::parse_response;
use crate::pipeline::render::PagePayload;
use crate::prompts::{user_instruction, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-2024-08-06";

/// Everything the oracle sees for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct OracleRequest<'a> {
    /// Source document, for logging.
    pub filename: &'a str,
    /// Fixed task instructions (the system prompt).
    pub instructions: &'a str,
    pub pages: &'a [PagePayload],
    /// Fields still missing; `None` on the first attempt.
    pub missing: Option<&'a BTreeSet<RequiredField>>,
    /// 0-based attempt number.
    pub attempt: usize,
}

/// A best-effort structured extractor.
///
/// `Ok` with an empty map is a valid "found nothing" answer and is distinct
/// from `Err`.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    async fn extract(&self, request: OracleRequest<'_>) -> Result<Map<String, Value>, OracleError>;
}

/// [`ExtractionOracle`] backed by an `edgequake-llm` vision provider.
pub struct LlmOracle {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }

    /// Resolve the provider from `config` and wrap it.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, EsgError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }
}

#[async_trait]
impl ExtractionOracle for LlmOracle {
    async fn extract(&self, request: OracleRequest<'_>) -> Result<Map<String, Value>, OracleError> {
        let start = Instant::now();
        let images = request.pages.iter().map(|p| p.image.clone()).collect();
        let text = user_instruction(request.missing);
        let messages = vec![
            ChatMessage::system(request.instructions),
            ChatMessage::user_with_images(&text, images),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        debug!(
            "{} attempt {}: {} pages, {} input tokens, {} output tokens, {:?}",
            request.filename,
            request.attempt + 1,
            request.pages.len(),
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        parse_response(&response.content)
    }
}

/// The system prompt for a run: the configured override or the default.
pub fn instructions(config: &ExtractionConfig) -> &str {
    config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT)
}

fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        response_format: Some("json_object".to_string()),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, EsgError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        EsgError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. a pre-built provider on the config
/// 2. a named provider plus model
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
/// 4. `OPENAI_API_KEY` → OpenAI with the default model
/// 5. `ProviderFactory::from_env()` auto-detection
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, EsgError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| EsgError::ProviderNotConfigured {
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
