use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::embedding::{Bm25SparseEmbedder, DenseEmbedder, EncodeTextClient, SparseEmbedder};
use crate::error::{InsightsError, Result};
use crate::llm::ChatCompletionsClient;
use crate::models::{
    CaseType, DataSource, Fragment, FragmentQuery, InsightPoint, InsightResult, InsightsRequest,
    INSIGHTS_CONTENT_TYPE,
};
use crate::pipeline::{until_cancelled, SummarizationPipeline};
use crate::qdrant_store::{FragmentStore, QdrantStore};
use crate::tokens::BpeTokenCounter;

const FRAGMENT_SEPARATOR: &str = "\n\n";

/// Payload keys owned by the insight point itself; never copied from source metadata.
const RESERVED_PAYLOAD_KEYS: [&str; 7] = [
    "page_content",
    "file_id",
    "case_id",
    "content_type",
    "case_type",
    "data_source",
    "generated_at",
];

/// Generate-or-retrieve entry point over the store, embedders and pipeline.
#[derive(Clone)]
pub struct InsightsService {
    store: Arc<dyn FragmentStore>,
    dense: Arc<dyn DenseEmbedder>,
    sparse: Arc<dyn SparseEmbedder>,
    pipeline: SummarizationPipeline,
}

impl InsightsService {
    pub fn new(
        store: Arc<dyn FragmentStore>,
        dense: Arc<dyn DenseEmbedder>,
        sparse: Arc<dyn SparseEmbedder>,
        pipeline: SummarizationPipeline,
    ) -> Self {
        Self {
            store,
            dense,
            sparse,
            pipeline,
        }
    }

    /// Wires the HTTP-backed collaborators described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let llm = ChatCompletionsClient::new(&config.models)?;
        let dense = EncodeTextClient::new(&config.models)?;
        let tokens = BpeTokenCounter::cl100k()?;
        let store = QdrantStore::new(
            config.qdrant_base_url.clone(),
            config.qdrant_collection.clone(),
        );

        let pipeline = SummarizationPipeline::new(
            Arc::new(llm),
            Arc::new(tokens),
            config.summarization.clone(),
        );

        Ok(Self::new(
            Arc::new(store),
            Arc::new(dense),
            Arc::new(Bm25SparseEmbedder::default()),
            pipeline,
        ))
    }

    pub fn store(&self) -> &Arc<dyn FragmentStore> {
        &self.store
    }

    /// Returns stored insights for the file when present; otherwise generates,
    /// stores and returns them. Nothing is written unless every step succeeds.
    pub async fn generate_or_retrieve(
        &self,
        request: &InsightsRequest,
        cancel: &CancellationToken,
    ) -> Result<InsightResult> {
        tracing::info!(
            "processing request: case_id={}, file_id={}",
            request.case_id,
            request.file_id
        );

        let case_type = CaseType::parse(&request.case_type)?;
        let data_source: DataSource = request.data_source.parse()?;
        if !case_type.is_known() {
            tracing::debug!("case type '{case_type}' is outside the advertised taxonomy");
        }

        let existing_query = FragmentQuery::for_file(&request.file_id)
            .content_type(INSIGHTS_CONTENT_TYPE)
            .case_type(case_type.as_str())
            .data_source(data_source.as_str());
        let existing = until_cancelled(cancel, self.store.fetch_fragments(&existing_query)).await?;
        if let Some(found) = existing.into_iter().next() {
            tracing::info!("found existing insights for file_id={}", request.file_id);
            return Ok(InsightResult::existing(found.text));
        }

        let fragments = self
            .fetch_source_fragments(&request.file_id, data_source, cancel)
            .await?;
        tracing::info!("found {} chunks", fragments.len());

        let texts: Vec<&str> = fragments
            .iter()
            .map(|f| f.text.as_str())
            .filter(|text| !text.is_empty())
            .collect();
        if texts.is_empty() {
            return Err(InsightsError::NotFound(format!(
                "no page_content found for file_id={}",
                request.file_id
            )));
        }

        let concatenated = texts.join(FRAGMENT_SEPARATOR);
        let outcome = self
            .pipeline
            .run(&concatenated, &case_type, data_source, cancel)
            .await?;

        let dense = until_cancelled(
            cancel,
            self.dense
                .embed(&outcome.insights, &request.case_id, &request.file_id),
        )
        .await?;
        let sparse = self.sparse.embed_sparse(&outcome.insights);

        let point = InsightPoint {
            id: Uuid::new_v4().to_string(),
            dense,
            sparse,
            payload: insight_payload(
                &outcome.insights,
                request,
                &case_type,
                data_source,
                &fragments[0],
            ),
        };
        let point_id = point.id.clone();
        until_cancelled(cancel, self.store.upsert_insight(point)).await?;
        tracing::info!("stored insights with point_id={point_id}");

        Ok(InsightResult::generated(outcome, texts.len()))
    }

    /// Content fragments for the data source, falling back to every
    /// non-insight fragment of the file when the strict fetch is empty.
    async fn fetch_source_fragments(
        &self,
        file_id: &str,
        data_source: DataSource,
        cancel: &CancellationToken,
    ) -> Result<Vec<Fragment>> {
        let strict = FragmentQuery::for_file(file_id).data_source(data_source.as_str());
        let fragments = without_insights(
            until_cancelled(cancel, self.store.fetch_fragments(&strict)).await?,
        );
        if !fragments.is_empty() {
            return Ok(fragments);
        }

        tracing::info!("falling back to all chunks without data_source filter");
        let relaxed = FragmentQuery::for_file(file_id);
        let fragments = without_insights(
            until_cancelled(cancel, self.store.fetch_fragments(&relaxed)).await?,
        );
        if fragments.is_empty() {
            return Err(InsightsError::NotFound(format!(
                "no chunks found for file_id={file_id}"
            )));
        }
        Ok(fragments)
    }
}

fn without_insights(fragments: Vec<Fragment>) -> Vec<Fragment> {
    fragments.into_iter().filter(|f| !f.is_insight()).collect()
}

fn insight_payload(
    insights: &str,
    request: &InsightsRequest,
    case_type: &CaseType,
    data_source: DataSource,
    sample: &Fragment,
) -> Map<String, Value> {
    let mut payload: Map<String, Value> = sample
        .metadata
        .iter()
        .filter(|(key, _)| !RESERVED_PAYLOAD_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    payload.insert("page_content".into(), Value::from(insights));
    payload.insert("file_id".into(), Value::from(request.file_id.as_str()));
    payload.insert("case_id".into(), Value::from(request.case_id.as_str()));
    payload.insert("content_type".into(), Value::from(INSIGHTS_CONTENT_TYPE));
    payload.insert("case_type".into(), Value::from(case_type.as_str()));
    payload.insert("data_source".into(), Value::from(data_source.as_str()));
    payload.insert("generated_at".into(), Value::from(Utc::now().to_rfc3339()));
    payload
}
