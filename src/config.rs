use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub llm: LLMConfig,
    pub pipeline: PipelineConfig,
    pub workers: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// When unset the service keeps job records in memory.
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub enabled: bool,
    pub queue_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub openai_api_key: String,
    pub openrouter_api_key: String,
    pub groq_api_key: String,
    pub glm_api_key: String,
    pub anthropic_api_key: String,
    pub timeout_secs: u64,
}

impl LLMConfig {
    /// API key for the configured provider, if one is set
    pub fn active_api_key(&self) -> Option<String> {
        let key = match self.provider.to_lowercase().as_str() {
            "openai" => &self.openai_api_key,
            "openrouter" => &self.openrouter_api_key,
            "groq" => &self.groq_api_key,
            "glm" | "glm-general" => &self.glm_api_key,
            "anthropic" => &self.anthropic_api_key,
            _ => return None,
        };
        if key.is_empty() {
            None
        } else {
            Some(key.clone())
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub summary_max_tokens: u32,
    pub checklist_max_tokens: u32,
    pub temperature: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            summary_max_tokens: 500,
            checklist_max_tokens: 800,
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub count: usize,
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 4,
            queue_capacity: 1024,
        }
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}", name))
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            server: ServerConfig {
                port: parse_var("PORT", "8000")?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "*".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            database: DatabaseConfig {
                url: optional_var("DATABASE_URL"),
                max_connections: parse_var("DB_MAX_CONNECTIONS", "10")?,
                min_connections: parse_var("DB_MIN_CONNECTIONS", "1")?,
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
                enabled: parse_var("USE_JOB_QUEUE", "false")?,
                queue_key: env::var("JOB_QUEUE_KEY").unwrap_or_else(|_| "guideline:jobs".to_string()),
            },
            llm: LLMConfig {
                provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string()),
                model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string()),
                base_url: optional_var("LLM_BASE_URL"),
                openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                openrouter_api_key: env::var("OPENROUTER_API_KEY").unwrap_or_default(),
                groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
                glm_api_key: env::var("GLM_API_KEY").unwrap_or_default(),
                anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
                timeout_secs: parse_var("LLM_TIMEOUT_SECS", "60")?,
            },
            pipeline: PipelineConfig {
                summary_max_tokens: parse_var("SUMMARY_MAX_TOKENS", "500")?,
                checklist_max_tokens: parse_var("CHECKLIST_MAX_TOKENS", "800")?,
                temperature: parse_var("LLM_TEMPERATURE", "0.3")?,
            },
            workers: WorkerConfig {
                count: parse_var("WORKER_COUNT", "4")?,
                queue_capacity: parse_var("QUEUE_CAPACITY", "1024")?,
            },
        };

        if config.workers.count == 0 {
            anyhow::bail!("WORKER_COUNT must be at least 1");
        }
        if config.workers.queue_capacity == 0 {
            anyhow::bail!("QUEUE_CAPACITY must be at least 1");
        }

        Ok(config)
    }

    /// In-memory store, channel queue, no provider keys.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            server: ServerConfig {
                port: 8000,
                host: "127.0.0.1".to_string(),
                cors_allowed_origins: vec!["*".to_string()],
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 1,
                min_connections: 1,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                enabled: false,
                queue_key: "guideline:jobs:test".to_string(),
            },
            llm: LLMConfig {
                provider: "openai".to_string(),
                model: "gpt-3.5-turbo".to_string(),
                base_url: None,
                openai_api_key: String::new(),
                openrouter_api_key: String::new(),
                groq_api_key: String::new(),
                glm_api_key: String::new(),
                anthropic_api_key: String::new(),
                timeout_secs: 5,
            },
            pipeline: PipelineConfig::default(),
            workers: WorkerConfig::default(),
        }
    }
}
