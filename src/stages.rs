use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{InsightsError, Result};
use crate::llm::LanguageModel;
use crate::models::{CaseType, DataSource};
use crate::pipeline::until_cancelled;
use crate::prompts;

/// Headroom granted to the mega-summary on top of its target length.
pub const MEGA_SUMMARY_HEADROOM_TOKENS: usize = 500;

/// Summarizes each chunk on its own; no context is shared between chunks.
#[derive(Clone)]
pub struct ChunkSummarizer {
    llm: Arc<dyn LanguageModel>,
    concurrency: usize,
}

impl ChunkSummarizer {
    pub fn new(llm: Arc<dyn LanguageModel>, concurrency: usize) -> Self {
        Self {
            llm,
            concurrency: concurrency.max(1),
        }
    }

    /// Returns one summary per chunk, at the chunk's index regardless of
    /// which request finished first. Any failure fails the whole stage.
    pub async fn summarize_all(
        &self,
        chunks: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let total = chunks.len();
        let mut slots: Vec<Option<String>> = vec![None; total];

        let mut pending = stream::iter(chunks.iter().cloned().enumerate())
            .map(|(idx, chunk)| {
                let llm = self.llm.clone();
                async move {
                    tracing::info!("summarizing chunk {}/{}", idx + 1, total);
                    let summary = llm
                        .generate(&prompts::chunk_summary_prompt(&chunk), None)
                        .await?;
                    tracing::info!("chunk {} summarized successfully", idx + 1);
                    Ok::<_, InsightsError>((idx, summary))
                }
            })
            .buffer_unordered(self.concurrency);

        while let Some(next) = until_cancelled(cancel, async { Ok(pending.next().await) }).await? {
            let (idx, summary) = next?;
            slots[idx] = Some(summary);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.ok_or_else(|| {
                    InsightsError::Internal(format!("chunk {} produced no summary", idx + 1))
                })
            })
            .collect()
    }
}

/// Folds the ordered chunk summaries into one mega-summary.
#[derive(Clone)]
pub struct ReductionStage {
    llm: Arc<dyn LanguageModel>,
}

impl ReductionStage {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// The output cap is `target_tokens + 500`; the result is not truncated
    /// if the model overshoots.
    pub async fn reduce(
        &self,
        summaries: &[String],
        target_tokens: usize,
        cancel: &CancellationToken,
    ) -> Result<String> {
        tracing::info!(
            "creating mega summary from {} chunk summaries",
            summaries.len()
        );
        let prompt = prompts::mega_summary_prompt(summaries, target_tokens);
        let cap = target_tokens.saturating_add(MEGA_SUMMARY_HEADROOM_TOKENS);
        until_cancelled(cancel, self.llm.generate(&prompt, Some(cap))).await
    }
}

#[derive(Clone)]
pub struct InsightExtractor {
    llm: Arc<dyn LanguageModel>,
}

impl InsightExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Returns the model output verbatim. The six schema fields are requested
    /// by the prompt only and are not checked here.
    pub async fn extract(
        &self,
        text: &str,
        case_type: &CaseType,
        data_source: DataSource,
        max_output_tokens: usize,
        cancel: &CancellationToken,
    ) -> Result<String> {
        tracing::info!("generating insights for {case_type} / {data_source}");
        let prompt = prompts::insights_prompt(text, case_type, data_source);
        until_cancelled(cancel, self.llm.generate(&prompt, Some(max_output_tokens))).await
    }
}
