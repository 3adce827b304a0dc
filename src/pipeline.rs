use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::SummarizationConfig;
use crate::error::{InsightsError, Result};
use crate::llm::LanguageModel;
use crate::models::{CaseType, DataSource, PipelineOutcome};
use crate::stages::{ChunkSummarizer, InsightExtractor, ReductionStage};
use crate::tokens::TokenCounter;

/// Awaits `fut` unless `cancel` fires first, in which case the future is dropped.
pub(crate) async fn until_cancelled<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(InsightsError::Cancelled),
        result = fut => result,
    }
}

/// Chooses between direct analysis and chunk → mega-summary → analysis.
#[derive(Clone)]
pub struct SummarizationPipeline {
    tokens: Arc<dyn TokenCounter>,
    summarizer: ChunkSummarizer,
    reducer: ReductionStage,
    extractor: InsightExtractor,
    config: SummarizationConfig,
}

impl SummarizationPipeline {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        tokens: Arc<dyn TokenCounter>,
        config: SummarizationConfig,
    ) -> Self {
        Self {
            tokens,
            summarizer: ChunkSummarizer::new(llm.clone(), config.summary_concurrency),
            reducer: ReductionStage::new(llm.clone()),
            extractor: InsightExtractor::new(llm),
            config,
        }
    }

    pub fn config(&self) -> &SummarizationConfig {
        &self.config
    }

    /// Strictly greater than the threshold; a text exactly at the limit goes direct.
    pub fn should_summarize(&self, total_tokens: usize) -> bool {
        total_tokens > self.config.max_tokens_before_summarization
    }

    pub async fn run(
        &self,
        text: &str,
        case_type: &CaseType,
        data_source: DataSource,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome> {
        let total_tokens = self.tokens.count(text);
        tracing::info!("total tokens: {total_tokens}");

        if !self.should_summarize(total_tokens) {
            tracing::info!("using direct approach");
            let insights = self
                .extractor
                .extract(
                    text,
                    case_type,
                    data_source,
                    self.config.insights_max_output_tokens,
                    cancel,
                )
                .await?;
            self.log_insights(&insights);

            return Ok(PipelineOutcome {
                insights,
                total_tokens,
                used_summarization: false,
                num_summary_chunks: None,
            });
        }

        tracing::info!(
            "using summarization approach ({} > {})",
            total_tokens,
            self.config.max_tokens_before_summarization
        );
        let chunks = self
            .tokens
            .split_into_chunks(text, self.config.chunk_size_for_summarization)?;
        let summaries = self.summarizer.summarize_all(&chunks, cancel).await?;
        for (idx, summary) in summaries.iter().enumerate() {
            tracing::info!(
                "chunk {} summary: {} tokens",
                idx + 1,
                self.tokens.count(summary)
            );
        }
        let mega_summary = self
            .reducer
            .reduce(&summaries, self.config.mega_summary_target, cancel)
            .await?;
        tracing::info!(
            "mega summary created: {} tokens",
            self.tokens.count(&mega_summary)
        );

        let insights = self
            .extractor
            .extract(
                &mega_summary,
                case_type,
                data_source,
                self.config.insights_max_output_tokens,
                cancel,
            )
            .await?;
        self.log_insights(&insights);

        Ok(PipelineOutcome {
            insights,
            total_tokens,
            used_summarization: true,
            num_summary_chunks: Some(chunks.len()),
        })
    }

    fn log_insights(&self, insights: &str) {
        tracing::info!("insights generated: {} tokens", self.tokens.count(insights));
    }
}
