use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub llm_url: String,
    pub llm_model: String,
    pub temperature: f32,
    pub llm_timeout: Duration,
    pub embedding_url: String,
    pub embedding_timeout: Duration,
}

/// Token budgets that drive the direct-vs-summarized decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummarizationConfig {
    pub max_tokens_before_summarization: usize,
    pub chunk_size_for_summarization: usize,
    pub mega_summary_target: usize,
    pub insights_max_output_tokens: usize,
    /// Upper bound on chunk summaries requested at once. 1 keeps them sequential.
    pub summary_concurrency: usize,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            max_tokens_before_summarization: 120_000,
            chunk_size_for_summarization: 50_000,
            mega_summary_target: 5_000,
            insights_max_output_tokens: 2_000,
            summary_concurrency: 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub qdrant_base_url: String,
    pub qdrant_collection: String,
    pub models: ModelConfig,
    pub summarization: SummarizationConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = SummarizationConfig::default();

        Self {
            bind_addr: env::var("INSIGHTS_BIND").unwrap_or_else(|_| "0.0.0.0:8081".to_string()),
            qdrant_base_url: env::var("QDRANT_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:6333".to_string()),
            qdrant_collection: env::var("QDRANT_COLLECTION")
                .unwrap_or_else(|_| "finance_docs".to_string()),
            models: ModelConfig {
                llm_url: env::var("LLM_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:8077/v1/chat/completions".to_string()),
                llm_model: env::var("LLM_MODEL")
                    .unwrap_or_else(|_| "RedHatAI/gemma-3-27b-it-quantized.w4a16".to_string()),
                temperature: parse_env("LLM_TEMPERATURE", 0.3),
                llm_timeout: Duration::from_secs(parse_env("LLM_TIMEOUT_SECS", 300)),
                embedding_url: env::var("EMBEDDING_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:8074/encode_text".to_string()),
                embedding_timeout: Duration::from_secs(parse_env("EMBEDDING_TIMEOUT_SECS", 60)),
            },
            summarization: SummarizationConfig {
                max_tokens_before_summarization: parse_env(
                    "MAX_TOKENS_BEFORE_SUMMARIZATION",
                    defaults.max_tokens_before_summarization,
                ),
                chunk_size_for_summarization: parse_env(
                    "CHUNK_SIZE_FOR_SUMMARIZATION",
                    defaults.chunk_size_for_summarization,
                ),
                mega_summary_target: parse_env("MEGA_SUMMARY_TARGET", defaults.mega_summary_target),
                insights_max_output_tokens: parse_env(
                    "INSIGHTS_MAX_TOKENS",
                    defaults.insights_max_output_tokens,
                ),
                summary_concurrency: parse_env("SUMMARY_CONCURRENCY", defaults.summary_concurrency)
                    .max(1),
            },
        }
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
