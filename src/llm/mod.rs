// LLM abstraction layer

pub mod provider;
pub mod openai;
pub mod anthropic;

pub use provider::*;
pub use crate::types::{LLMMessage, LLMProvider, LLMRequest, LLMResponse, TokenUsage};
