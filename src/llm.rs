use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{InsightsError, Result, UpstreamReason, UpstreamService};

/// Text generation backend: one prompt in, generated text out.
///
/// Implementations make a single attempt per call. Callers that want retries
/// wrap the whole insight request, which is safe to repeat. Sampling
/// temperature is client configuration (`LLM_TEMPERATURE`, default 0.3), so
/// every stage generates with the same value.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str, max_output_tokens: Option<usize>) -> Result<String>;
}

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    url: String,
    model: String,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.llm_timeout)
            .build()
            .map_err(|err| InsightsError::Internal(format!("failed to build llm client: {err}")))?;

        Ok(Self {
            client,
            url: config.llm_url.clone(),
            model: config.llm_model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn generate(&self, prompt: &str, max_output_tokens: Option<usize>) -> Result<String> {
        #[derive(Serialize)]
        struct ChatReq<'a> {
            model: &'a str,
            messages: [ChatMessage<'a>; 1],
            temperature: f32,
            #[serde(skip_serializing_if = "Option::is_none")]
            max_tokens: Option<usize>,
        }

        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct ChatResp {
            choices: Vec<Choice>,
            #[serde(default)]
            usage: Option<Usage>,
        }

        #[derive(Deserialize)]
        struct Usage {
            prompt_tokens: Option<u64>,
            completion_tokens: Option<u64>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: Option<String>,
        }

        tracing::info!(
            "calling llm at {} (prompt {} chars, max_tokens={:?})",
            self.url,
            prompt.len(),
            max_output_tokens
        );

        let response = self
            .client
            .post(&self.url)
            .json(&ChatReq {
                model: &self.model,
                messages: [ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                temperature: self.temperature,
                max_tokens: max_output_tokens,
            })
            .send()
            .await
            .map_err(|err| InsightsError::from_transport(UpstreamService::LanguageModel, err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| InsightsError::from_transport(UpstreamService::LanguageModel, err))?;

        if !status.is_success() {
            tracing::error!("llm call failed with {status}");
            return Err(InsightsError::upstream(
                UpstreamService::LanguageModel,
                UpstreamReason::Status,
                format!("{status}: {}", normalize_err_body(&body)),
            ));
        }

        let parsed = serde_json::from_str::<ChatResp>(&body).ok();
        if let Some(usage) = parsed.as_ref().and_then(|resp| resp.usage.as_ref()) {
            tracing::info!(
                "llm usage: prompt_tokens={:?} completion_tokens={:?}",
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        let content = parsed
            .and_then(|resp| resp.choices.into_iter().next())
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                InsightsError::upstream(
                    UpstreamService::LanguageModel,
                    UpstreamReason::MalformedResponse,
                    "response has no choices[0].message.content",
                )
            })?;

        tracing::info!("llm response received: {} chars", content.len());
        Ok(content)
    }
}

pub(crate) fn normalize_err_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(err) = json.get("error").and_then(|v| v.as_str()) {
            return err.to_string();
        }
        if let Some(msg) = json.pointer("/error/message").and_then(|v| v.as_str()) {
            return msg.to_string();
        }
        if let Some(detail) = json.get("detail").and_then(|v| v.as_str()) {
            return detail.to_string();
        }
    }

    trimmed.to_string()
}
