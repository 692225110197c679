use std::time::Duration;

use async_trait::async_trait;

use crate::config::LLMConfig;
use crate::llm::anthropic::AnthropicAdapter;
use crate::llm::openai::{self, OpenAIAdapter};
use crate::types::{AppError, AppResult, LLMMessage, LLMProvider, LLMRequest, LLMResponse};

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Sampling bounds for a single generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

/// Text-generation capability used by the pipeline: prompt in, text out.
///
/// Implementations report every upstream fault (network, auth, rate limit,
/// malformed response, timeout) as `AppError::Gateway`.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn generate(&self, prompt: &str, params: GenerationParams) -> AppResult<String>;
}

/// Configuration for LLM provider (renamed to avoid conflict with LLMProvider enum in types.rs)
pub struct LLMProviderConfig {
    pub name: String,
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl LLMProviderConfig {
    pub fn from_config(config: &LLMConfig) -> AppResult<Self> {
        let api_key = config.active_api_key().ok_or_else(|| {
            AppError::Internal(format!("No API key configured for provider '{}'", config.provider))
        })?;

        Ok(Self {
            name: config.provider.clone(),
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            timeout: config.timeout(),
        })
    }
}

pub struct LLM {
    adapter: Box<dyn LLMAdapter>,
    provider: LLMProvider,
    model: String,
    timeout: Duration,
}

impl LLM {
    pub fn new(config: LLMProviderConfig) -> AppResult<Self> {
        let provider = LLMProvider::parse(&config.name)
            .ok_or_else(|| AppError::Internal(format!("Unsupported provider: {}", config.name)))?;

        let base = config.base_url.as_deref();
        let adapter: Box<dyn LLMAdapter> = match provider {
            LLMProvider::OpenAI => Box::new(OpenAIAdapter::new_with_api_base(
                &config.api_key,
                base.unwrap_or(openai::OPENAI_API_BASE),
            )),
            LLMProvider::OpenRouter => Box::new(OpenAIAdapter::new_with_api_base(
                &config.api_key,
                base.unwrap_or(openai::OPENROUTER_API_BASE),
            )),
            LLMProvider::Groq => Box::new(OpenAIAdapter::new_with_api_base(
                &config.api_key,
                base.unwrap_or(openai::GROQ_API_BASE),
            )),
            LLMProvider::GLM => Box::new(OpenAIAdapter::new_with_api_base(
                &config.api_key,
                base.unwrap_or(openai::GLM_API_BASE),
            )),
            LLMProvider::Anthropic => Box::new(match base {
                Some(url) => AnthropicAdapter::new_with_api_base(&config.api_key, url),
                None => AnthropicAdapter::new(&config.api_key),
            }),
        };

        Ok(Self::with_adapter(adapter, provider, config.model, config.timeout))
    }

    pub fn with_adapter(
        adapter: Box<dyn LLMAdapter>,
        provider: LLMProvider,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            provider,
            model: model.into(),
            timeout,
        }
    }

    pub fn provider(&self) -> LLMProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        match tokio::time::timeout(self.timeout, self.adapter.create_chat_completion(request)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Gateway(format!(
                "{} request timed out after {}s",
                self.provider,
                self.timeout.as_secs_f32()
            ))),
        }
    }
}

#[async_trait]
impl ModelGateway for LLM {
    async fn generate(&self, prompt: &str, params: GenerationParams) -> AppResult<String> {
        let request = LLMRequest {
            model: self.model.clone(),
            messages: vec![LLMMessage::user(prompt)],
            max_tokens: Some(params.max_output_tokens),
            temperature: Some(params.temperature),
        };

        let response = self.create_chat_completion(&request).await?;

        tracing::debug!(
            provider = %self.provider,
            model = %self.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            finish_reason = %response.finish_reason,
            "Generation complete"
        );

        Ok(response.content)
    }
}
