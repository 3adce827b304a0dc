use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use mur3::murmurhash3_x86_32;
use reqwest::Client;
use rust_stemmers::{Algorithm, Stemmer};
use serde::Deserialize;

use crate::config::ModelConfig;
use crate::error::{InsightsError, Result, UpstreamReason, UpstreamService};
use crate::llm::normalize_err_body;
use crate::models::SparseVector;

#[async_trait]
pub trait DenseEmbedder: Send + Sync {
    async fn embed(&self, text: &str, case_id: &str, file_id: &str) -> Result<Vec<f32>>;
}

pub trait SparseEmbedder: Send + Sync {
    fn embed_sparse(&self, text: &str) -> SparseVector;
}

/// Client for the form-encoded `encode_text` embedding service.
#[derive(Clone)]
pub struct EncodeTextClient {
    client: Client,
    url: String,
}

impl EncodeTextClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.embedding_timeout)
            .build()
            .map_err(|err| {
                InsightsError::Internal(format!("failed to build embedding client: {err}"))
            })?;

        Ok(Self {
            client,
            url: config.embedding_url.clone(),
        })
    }
}

#[async_trait]
impl DenseEmbedder for EncodeTextClient {
    async fn embed(&self, text: &str, case_id: &str, file_id: &str) -> Result<Vec<f32>> {
        #[derive(Deserialize)]
        struct EncodeResp {
            status: Option<String>,
            #[serde(default)]
            embeddings: Option<Vec<f32>>,
        }

        let response = self
            .client
            .post(&self.url)
            .header("accept", "application/json")
            .form(&[
                ("text", text),
                ("ingest", "false"),
                ("case_id", case_id),
                ("file_id", file_id),
            ])
            .send()
            .await
            .map_err(|err| InsightsError::from_transport(UpstreamService::Embedding, err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| InsightsError::from_transport(UpstreamService::Embedding, err))?;

        if !status.is_success() {
            tracing::error!("embedding api error {status}: {}", body.trim());
            return Err(InsightsError::upstream(
                UpstreamService::Embedding,
                UpstreamReason::Status,
                format!("{status}: {}", normalize_err_body(&body)),
            ));
        }

        let parsed = serde_json::from_str::<EncodeResp>(&body).map_err(|err| {
            InsightsError::upstream(
                UpstreamService::Embedding,
                UpstreamReason::MalformedResponse,
                err.to_string(),
            )
        })?;

        if parsed.status.as_deref() != Some("success") {
            return Err(InsightsError::upstream(
                UpstreamService::Embedding,
                UpstreamReason::GenerationFailed,
                "embedding generation failed",
            ));
        }

        parsed.embeddings.ok_or_else(|| {
            InsightsError::upstream(
                UpstreamService::Embedding,
                UpstreamReason::MalformedResponse,
                "response has no embeddings",
            )
        })
    }
}

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;
const BM25_AVG_LEN: f32 = 256.0;
const MAX_TOKEN_CHARS: usize = 40;

/// NLTK English stop list, matched against lowercased tokens before stemming.
const STOP_WORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't",
    "didn", "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven",
    "haven't", "isn", "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn",
    "needn't", "shan", "shan't", "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't",
    "won", "won't", "wouldn", "wouldn't",
];

/// Document-side BM25 weights in the `Qdrant/bm25` vocabulary: lowercased
/// word tokens, NLTK stop words dropped, Snowball English stems, and term id
/// `|murmur3_32(stem)|` read as a signed 32-bit hash.
#[derive(Clone)]
pub struct Bm25SparseEmbedder {
    stemmer: Arc<Stemmer>,
    k1: f32,
    b: f32,
    avg_len: f32,
}

impl Default for Bm25SparseEmbedder {
    fn default() -> Self {
        Self {
            stemmer: Arc::new(Stemmer::create(Algorithm::English)),
            k1: BM25_K1,
            b: BM25_B,
            avg_len: BM25_AVG_LEN,
        }
    }
}

impl Bm25SparseEmbedder {
    fn stems(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|token| !token.is_empty())
            .filter(|token| !STOP_WORDS.contains(token))
            .filter(|token| token.chars().count() <= MAX_TOKEN_CHARS)
            .map(|token| self.stemmer.stem(token).into_owned())
            .filter(|stem| !stem.is_empty())
            .collect()
    }
}

impl SparseEmbedder for Bm25SparseEmbedder {
    fn embed_sparse(&self, text: &str) -> SparseVector {
        let stems = self.stems(text);
        if stems.is_empty() {
            return SparseVector::default();
        }

        let doc_len = stems.len() as f32;
        let mut tf: HashMap<u32, usize> = HashMap::new();
        for stem in &stems {
            *tf.entry(term_index(stem)).or_insert(0) += 1;
        }

        let norm = self.k1 * (1.0 - self.b + self.b * doc_len / self.avg_len);
        let weights: BTreeMap<u32, f32> = tf
            .into_iter()
            .map(|(index, freq)| {
                let freq = freq as f32;
                (index, freq * (self.k1 + 1.0) / (freq + norm))
            })
            .collect();

        let (indices, values) = weights.into_iter().unzip();
        SparseVector { indices, values }
    }
}

fn term_index(stem: &str) -> u32 {
    (murmurhash3_x86_32(stem.as_bytes(), 0) as i32).unsigned_abs()
}
