// Type definitions and enums

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LLMProvider {
    OpenAI,
    OpenRouter,
    Groq,
    GLM,
    Anthropic,
}

impl LLMProvider {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "openai" => Some(LLMProvider::OpenAI),
            "openrouter" => Some(LLMProvider::OpenRouter),
            "groq" => Some(LLMProvider::Groq),
            "glm" | "glm-general" => Some(LLMProvider::GLM),
            "anthropic" => Some(LLMProvider::Anthropic),
            _ => None,
        }
    }
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Groq => write!(f, "groq"),
            LLMProvider::GLM => write!(f, "glm"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMRequest {
    pub model: String,
    pub messages: Vec<LLMMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LLMMessage {
    pub role: String, // "user", "assistant", "system"
    pub content: String,
}

impl LLMMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Model gateway error: {0}")]
    Gateway(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: crate::models::JobStatus,
        to: crate::models::JobStatus,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Queue(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "Job not found".to_string()),
            other => {
                tracing::error!(error = %other, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(LLMProvider::parse("openai"), Some(LLMProvider::OpenAI));
        assert_eq!(LLMProvider::parse(" Anthropic "), Some(LLMProvider::Anthropic));
        assert_eq!(LLMProvider::parse("glm-general"), Some(LLMProvider::GLM));
        assert_eq!(LLMProvider::parse("mystery"), None);
    }

    #[test]
    fn test_error_status_codes() {
        let validation = AppError::Validation("bad".to_string()).into_response();
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);

        let missing = AppError::NotFound("job".to_string()).into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let gateway = AppError::Gateway("upstream".to_string()).into_response();
        assert_eq!(gateway.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
