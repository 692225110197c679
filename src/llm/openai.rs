// OpenAI-compatible chat completions adapter
// Serves OpenAI itself plus the providers exposing the same wire format
// (OpenRouter, Groq, GLM general API) through a different base URL.

use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";
pub const GLM_API_BASE: &str = "https://api.z.ai/api/paas/v4";

pub struct OpenAIAdapter {
    client: Client,
    api_key: String,
    api_base: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl OpenAIAdapter {
    pub fn new(api_key: &str) -> Self {
        Self::new_with_api_base(api_key, OPENAI_API_BASE)
    }

    pub fn new_with_api_base(api_key: &str, api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn api_base(&self) -> &str {
        &self.api_base
    }

    fn build_messages(request: &LLMRequest) -> Vec<ChatMessage<'_>> {
        request
            .messages
            .iter()
            .map(|m| ChatMessage {
                role: m.role.as_str(),
                content: m.content.as_str(),
            })
            .collect()
    }
}

#[async_trait]
impl LLMAdapter for OpenAIAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = format!("{}/chat/completions", self.api_base());

        let body = ChatRequest {
            model: &request.model,
            messages: Self::build_messages(request),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("chat completion request failed: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
                return Err(AppError::Gateway(match error_response.error.code {
                    Some(code) => format!(
                        "API error ({}): {} (code: {})",
                        status, error_response.error.message, code
                    ),
                    None => format!("API error ({}): {}", status, error_response.error.message),
                }));
            }

            return Err(AppError::Gateway(format!("API error ({}): {}", status, error_text)));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse chat completion: {}", e)))?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Gateway("API returned no choices".to_string()))?;

        let usage = chat_response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LLMMessage;

    fn request() -> LLMRequest {
        LLMRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![LLMMessage::user("Summarize this")],
            max_tokens: Some(500),
            temperature: Some(0.3),
        }
    }

    #[test]
    fn test_api_base_is_normalized() {
        let adapter = OpenAIAdapter::new_with_api_base("key", "http://localhost:1234/v1/");
        assert_eq!(adapter.api_base(), "http://localhost:1234/v1");
        assert_eq!(OpenAIAdapter::new("key").api_base(), OPENAI_API_BASE);
    }

    #[test]
    fn test_messages_keep_roles_and_order() {
        let mut req = request();
        req.messages.push(LLMMessage::new("assistant", "Done"));
        let messages = OpenAIAdapter::build_messages(&req);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, "Summarize this");
        assert_eq!(messages[1].role, "assistant");
    }

    #[tokio::test]
    async fn test_chat_completion_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 500,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "choices": [{"message": {"role": "assistant", "content": "  A summary.  "}, "finish_reason": "stop"}],
                    "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
                }"#,
            )
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new_with_api_base("sk-test", &server.url());
        let response = adapter.create_chat_completion(&request()).await.unwrap();

        assert_eq!(response.content, "  A summary.  ");
        assert_eq!(response.finish_reason, "stop");
        assert_eq!(response.usage.total_tokens, 13);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_chat_completion_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": {"message": "Rate limit reached", "code": "rate_limit_exceeded"}}"#)
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new_with_api_base("sk-test", &server.url());
        let err = adapter.create_chat_completion(&request()).await.unwrap_err();

        match err {
            AppError::Gateway(msg) => {
                assert!(msg.contains("429"));
                assert!(msg.contains("Rate limit reached"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chat_completion_without_choices() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new_with_api_base("sk-test", &server.url());
        let err = adapter.create_chat_completion(&request()).await.unwrap_err();
        assert!(matches!(err, AppError::Gateway(msg) if msg.contains("no choices")));
    }
}
