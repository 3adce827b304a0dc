use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{InsightsError, Result, UpstreamReason, UpstreamService};
use crate::llm::normalize_err_body;
use crate::models::{Fragment, FragmentQuery, InsightPoint, SparseVector};

const SCROLL_PAGE_SIZE: usize = 100;
pub const DENSE_VECTOR_NAME: &str = "dense-embed";
pub const SPARSE_VECTOR_NAME: &str = "sparse-embed";

/// Filtered retrieval and insight storage over the indexed collection.
#[async_trait]
pub trait FragmentStore: Send + Sync {
    /// Returns every point matching the query, in store order.
    async fn fetch_fragments(&self, query: &FragmentQuery) -> Result<Vec<Fragment>>;

    async fn upsert_insight(&self, point: InsightPoint) -> Result<()>;

    /// Number of collections visible to the store client.
    async fn collection_count(&self) -> Result<usize>;
}

#[derive(Clone)]
pub struct QdrantStore {
    client: Client,
    base_url: String,
    collection: String,
}

impl QdrantStore {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
        }
    }

    async fn scroll_page(&self, filter: &Value, offset: Option<&Value>) -> Result<ScrollResult> {
        let url = format!(
            "{}/collections/{}/points/scroll",
            self.base_url, self.collection
        );

        let mut body = json!({
            "filter": filter,
            "limit": SCROLL_PAGE_SIZE,
            "with_payload": true,
            "with_vector": false,
        });
        if let Some(offset) = offset {
            body["offset"] = offset.clone();
        }

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|err| InsightsError::from_transport(UpstreamService::VectorStore, err))?;

        let response = decode::<QdrantResponse<ScrollResult>>(response).await?;
        Ok(response.result)
    }
}

#[async_trait]
impl FragmentStore for QdrantStore {
    async fn fetch_fragments(&self, query: &FragmentQuery) -> Result<Vec<Fragment>> {
        let filter = build_filter(query);
        let mut fragments = Vec::new();
        let mut offset: Option<Value> = None;

        loop {
            let page = self.scroll_page(&filter, offset.as_ref()).await?;
            let batch_len = page.points.len();
            fragments.extend(page.points.into_iter().map(Fragment::from));

            match page.next_page_offset {
                Some(next) if !next.is_null() && batch_len >= SCROLL_PAGE_SIZE => {
                    offset = Some(next)
                }
                _ => break,
            }
        }

        tracing::info!(
            "retrieved {} points for file_id={}, content_type={:?}",
            fragments.len(),
            query.file_id,
            query.content_type
        );
        Ok(fragments)
    }

    async fn upsert_insight(&self, point: InsightPoint) -> Result<()> {
        let url = format!(
            "{}/collections/{}/points?wait=true",
            self.base_url, self.collection
        );
        let body = json!({ "points": [QdrantPoint::from(point)] });

        let response = self
            .client
            .put(url)
            .json(&body)
            .send()
            .await
            .map_err(|err| InsightsError::from_transport(UpstreamService::VectorStore, err))?;

        decode::<QdrantResponse<Value>>(response).await?;
        Ok(())
    }

    async fn collection_count(&self) -> Result<usize> {
        #[derive(Deserialize)]
        struct CollectionsResult {
            collections: Vec<Value>,
        }

        let response = self
            .client
            .get(format!("{}/collections", self.base_url))
            .send()
            .await
            .map_err(|err| InsightsError::from_transport(UpstreamService::VectorStore, err))?;

        let response = decode::<QdrantResponse<CollectionsResult>>(response).await?;
        Ok(response.result.collections.len())
    }
}

fn build_filter(query: &FragmentQuery) -> Value {
    let mut must = vec![match_condition("file_id", &query.file_id)];
    let optional = [
        ("content_type", &query.content_type),
        ("case_type", &query.case_type),
        ("data_source", &query.data_source),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            must.push(match_condition(key, value));
        }
    }
    json!({ "must": must })
}

fn match_condition(key: &str, value: &str) -> Value {
    json!({ "key": key, "match": { "value": value } })
}

async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| InsightsError::from_transport(UpstreamService::VectorStore, err))?;

    if !status.is_success() {
        return Err(InsightsError::upstream(
            UpstreamService::VectorStore,
            UpstreamReason::Status,
            format!("{status}: {}", normalize_err_body(&body)),
        ));
    }

    serde_json::from_str(&body).map_err(|err| {
        InsightsError::upstream(
            UpstreamService::VectorStore,
            UpstreamReason::MalformedResponse,
            err.to_string(),
        )
    })
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<ScrolledPoint>,
    next_page_offset: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ScrolledPoint {
    id: Value,
    payload: Option<Map<String, Value>>,
}

impl From<ScrolledPoint> for Fragment {
    fn from(point: ScrolledPoint) -> Self {
        let mut metadata = point.payload.unwrap_or_default();
        let text = match metadata.remove("page_content") {
            Some(Value::String(text)) => text,
            _ => String::new(),
        };
        let id = match point.id {
            Value::String(id) => id,
            other => other.to_string(),
        };
        Fragment { id, text, metadata }
    }
}

#[derive(Debug, Serialize)]
struct QdrantPoint {
    id: String,
    vector: Map<String, Value>,
    payload: Map<String, Value>,
}

impl From<InsightPoint> for QdrantPoint {
    fn from(point: InsightPoint) -> Self {
        let SparseVector { indices, values } = point.sparse;
        let mut vector = Map::new();
        vector.insert(DENSE_VECTOR_NAME.to_string(), json!(point.dense));
        vector.insert(
            SPARSE_VECTOR_NAME.to_string(),
            json!({ "indices": indices, "values": values }),
        );
        Self {
            id: point.id,
            vector,
            payload: point.payload,
        }
    }
}
