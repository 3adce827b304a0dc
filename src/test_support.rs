//! Deterministic stand-ins for the model, tokenizer, embedders and store.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::embedding::{DenseEmbedder, SparseEmbedder};
use crate::error::{InsightsError, Result, UpstreamReason, UpstreamService};
use crate::llm::LanguageModel;
use crate::models::{Fragment, FragmentQuery, InsightPoint, SparseVector};
use crate::qdrant_store::FragmentStore;
use crate::tokens::{token_windows, TokenCounter};

/// `"w0 w1 ... w{n-1}"`, exactly `n` tokens for [`WordTokenCounter`].
pub fn words(n: usize) -> String {
    (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
}

/// One token per whitespace-separated word.
pub struct WordTokenCounter;

impl TokenCounter for WordTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn split_into_chunks(&self, text: &str, chunk_size: usize) -> Result<Vec<String>> {
        let words: Vec<&str> = text.split_whitespace().collect();
        Ok(token_windows(&words, chunk_size)?
            .map(|window| window.join(" "))
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    ChunkSummary,
    MegaSummary,
    Insights,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub kind: CallKind,
    pub prompt: String,
    pub max_output_tokens: Option<usize>,
}

/// Answers by prompt kind; chunk summaries echo the chunk's first word.
#[derive(Default)]
pub struct ScriptedModel {
    calls: Mutex<Vec<Call>>,
    completed: Mutex<Vec<String>>,
    chunk_delay: Option<fn(usize) -> Duration>,
    fail_on_word: Option<String>,
    fail_kind: Option<CallKind>,
}

impl ScriptedModel {
    pub const MEGA_SUMMARY: &'static str = "MEGA SUMMARY";
    pub const INSIGHTS: &'static str = "Summary: generated insights\nClassification: Low risk";

    pub fn with_chunk_delay(mut self, delay: fn(usize) -> Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn failing_on(mut self, first_word: &str) -> Self {
        self.fail_on_word = Some(first_word.to_string());
        self
    }

    pub fn failing_kind(mut self, kind: CallKind) -> Self {
        self.fail_kind = Some(kind);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<CallKind> {
        self.calls().into_iter().map(|c| c.kind).collect()
    }

    /// First words of chunks in the order their summaries completed.
    pub fn completion_order(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    pub fn chunk_text(prompt: &str) -> &str {
        let start = prompt.find("Text:\n").map(|i| i + "Text:\n".len()).unwrap_or(0);
        let end = prompt.rfind("\n\nSummary:").unwrap_or(prompt.len());
        &prompt[start..end]
    }

    fn classify(prompt: &str) -> CallKind {
        if prompt.starts_with("Summarize the following text") {
            CallKind::ChunkSummary
        } else if prompt.starts_with("Synthesize the following summaries") {
            CallKind::MegaSummary
        } else {
            CallKind::Insights
        }
    }

    fn failure() -> InsightsError {
        InsightsError::upstream(
            UpstreamService::LanguageModel,
            UpstreamReason::Status,
            "500 Internal Server Error: scripted failure",
        )
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str, max_output_tokens: Option<usize>) -> Result<String> {
        let kind = Self::classify(prompt);
        self.calls.lock().unwrap().push(Call {
            kind,
            prompt: prompt.to_string(),
            max_output_tokens,
        });

        if self.fail_kind == Some(kind) {
            return Err(Self::failure());
        }

        match kind {
            CallKind::ChunkSummary => {
                let first = Self::chunk_text(prompt)
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                if self.fail_on_word.as_deref() == Some(first.as_str()) {
                    return Err(Self::failure());
                }
                if let Some(delay) = self.chunk_delay {
                    let n = first.trim_start_matches('w').parse().unwrap_or(0);
                    let delay = delay(n);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                self.completed.lock().unwrap().push(first.clone());
                Ok(format!("summary of {first}"))
            }
            CallKind::MegaSummary => Ok(Self::MEGA_SUMMARY.to_string()),
            CallKind::Insights => Ok(Self::INSIGHTS.to_string()),
        }
    }
}

/// Returns a fixed vector and counts calls.
#[derive(Default)]
pub struct FixedDenseEmbedder {
    pub calls: Mutex<usize>,
    pub fail: bool,
}

#[async_trait]
impl DenseEmbedder for FixedDenseEmbedder {
    async fn embed(&self, _text: &str, _case_id: &str, _file_id: &str) -> Result<Vec<f32>> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(InsightsError::upstream(
                UpstreamService::Embedding,
                UpstreamReason::GenerationFailed,
                "embedding generation failed",
            ));
        }
        Ok(vec![0.1, 0.2, 0.3])
    }
}

pub struct FixedSparseEmbedder;

impl SparseEmbedder for FixedSparseEmbedder {
    fn embed_sparse(&self, _text: &str) -> SparseVector {
        SparseVector {
            indices: vec![7],
            values: vec![1.0],
        }
    }
}

/// In-memory store that applies the same match filters as Qdrant.
#[derive(Default)]
pub struct MemoryStore {
    points: Mutex<Vec<Fragment>>,
    queries: Mutex<Vec<FragmentQuery>>,
    upserts: Mutex<Vec<InsightPoint>>,
}

impl MemoryStore {
    pub fn with_fragments(fragments: Vec<Fragment>) -> Self {
        Self {
            points: Mutex::new(fragments),
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<FragmentQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn upserts(&self) -> Vec<InsightPoint> {
        self.upserts.lock().unwrap().clone()
    }
}

pub fn fragment(id: &str, text: &str, fields: &[(&str, &str)]) -> Fragment {
    let metadata: Map<String, Value> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    Fragment {
        id: id.to_string(),
        text: text.to_string(),
        metadata,
    }
}

fn matches(fragment: &Fragment, key: &str, expected: &Option<String>) -> bool {
    match expected {
        Some(expected) => fragment.metadata.get(key).and_then(Value::as_str) == Some(expected),
        None => true,
    }
}

#[async_trait]
impl FragmentStore for MemoryStore {
    async fn fetch_fragments(&self, query: &FragmentQuery) -> Result<Vec<Fragment>> {
        self.queries.lock().unwrap().push(query.clone());
        let file_id = Some(query.file_id.clone());
        Ok(self
            .points
            .lock()
            .unwrap()
            .iter()
            .filter(|f| matches(f, "file_id", &file_id))
            .filter(|f| matches(f, "content_type", &query.content_type))
            .filter(|f| matches(f, "case_type", &query.case_type))
            .filter(|f| matches(f, "data_source", &query.data_source))
            .cloned()
            .collect())
    }

    async fn upsert_insight(&self, point: InsightPoint) -> Result<()> {
        let mut metadata = point.payload.clone();
        let text = match metadata.remove("page_content") {
            Some(Value::String(text)) => text,
            _ => String::new(),
        };
        self.points.lock().unwrap().push(Fragment {
            id: point.id.clone(),
            text,
            metadata,
        });
        self.upserts.lock().unwrap().push(point);
        Ok(())
    }

    async fn collection_count(&self) -> Result<usize> {
        Ok(1)
    }
}
