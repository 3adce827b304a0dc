use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::InsightsError;

/// Payload value of `content_type` that marks a stored insight point.
pub const INSIGHTS_CONTENT_TYPE: &str = "insights";

/// Case taxonomy advertised to callers. Requests may use any non-blank case type.
pub const KNOWN_CASE_TYPES: [&str; 7] = [
    "Drug Trafficking and Substance Abuse",
    "Arms Trafficking",
    "Cyber Crime",
    "Terrorism",
    "Murder and Homicide",
    "Suicide",
    "General",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Audio,
    Video,
    Image,
    UfedExtraction,
    Others,
}

impl DataSource {
    pub const ALL: [DataSource; 5] = [
        DataSource::Audio,
        DataSource::Video,
        DataSource::Image,
        DataSource::UfedExtraction,
        DataSource::Others,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Audio => "audio",
            DataSource::Video => "video",
            DataSource::Image => "image",
            DataSource::UfedExtraction => "ufed_extraction",
            DataSource::Others => "others",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = InsightsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        DataSource::ALL
            .into_iter()
            .find(|source| source.as_str() == value)
            .ok_or_else(|| {
                let allowed: Vec<&str> = DataSource::ALL.iter().map(|s| s.as_str()).collect();
                InsightsError::InvalidInput(format!(
                    "invalid data_source '{value}', must be one of: {}",
                    allowed.join(", ")
                ))
            })
    }
}

/// Free-text case type. Only blankness is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseType(String);

impl CaseType {
    pub fn parse(value: &str) -> Result<Self, InsightsError> {
        if value.trim().is_empty() {
            return Err(InsightsError::InvalidInput(
                "case_type cannot be empty".to_string(),
            ));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        KNOWN_CASE_TYPES.contains(&self.0.as_str())
    }
}

impl fmt::Display for CaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One previously indexed point for a file.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
}

impl Fragment {
    pub fn content_type(&self) -> Option<&str> {
        self.metadata.get("content_type").and_then(Value::as_str)
    }

    pub fn is_insight(&self) -> bool {
        self.content_type() == Some(INSIGHTS_CONTENT_TYPE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentQuery {
    pub file_id: String,
    pub content_type: Option<String>,
    pub case_type: Option<String>,
    pub data_source: Option<String>,
}

impl FragmentQuery {
    pub fn for_file(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            ..Self::default()
        }
    }

    pub fn content_type(mut self, value: impl Into<String>) -> Self {
        self.content_type = Some(value.into());
        self
    }

    pub fn case_type(mut self, value: impl Into<String>) -> Self {
        self.case_type = Some(value.into());
        self
    }

    pub fn data_source(mut self, value: impl Into<String>) -> Self {
        self.data_source = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

/// A generated insight ready to be written to the vector store.
#[derive(Debug, Clone)]
pub struct InsightPoint {
    pub id: String,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsightSource {
    Existing,
    Generated,
}

/// Output of the summarization decision pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub insights: String,
    pub total_tokens: usize,
    pub used_summarization: bool,
    pub num_summary_chunks: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightResult {
    pub insights: String,
    pub source: InsightSource,
    pub used_summarization: bool,
    pub num_summary_chunks: Option<usize>,
    pub chunk_count: Option<usize>,
    pub total_tokens: Option<usize>,
}

impl InsightResult {
    pub fn existing(insights: String) -> Self {
        Self {
            insights,
            source: InsightSource::Existing,
            used_summarization: false,
            num_summary_chunks: None,
            chunk_count: None,
            total_tokens: None,
        }
    }

    pub fn generated(outcome: PipelineOutcome, chunk_count: usize) -> Self {
        Self {
            insights: outcome.insights,
            source: InsightSource::Generated,
            used_summarization: outcome.used_summarization,
            num_summary_chunks: outcome.num_summary_chunks,
            chunk_count: Some(chunk_count),
            total_tokens: Some(outcome.total_tokens),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsRequest {
    pub case_id: String,
    pub file_id: String,
    pub case_type: String,
    pub data_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsResponse {
    pub case_id: String,
    pub file_id: String,
    pub case_type: String,
    pub data_source: String,
    pub insights: String,
    pub source: InsightSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<usize>,
    pub used_summarization: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_summary_chunks: Option<usize>,
}

impl InsightsResponse {
    pub fn new(request: InsightsRequest, result: InsightResult) -> Self {
        Self {
            case_id: request.case_id,
            file_id: request.file_id,
            case_type: request.case_type,
            data_source: request.data_source,
            insights: result.insights,
            source: result.source,
            chunk_count: result.chunk_count,
            total_tokens: result.total_tokens,
            used_summarization: result.used_summarization,
            num_summary_chunks: result.num_summary_chunks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_source_parses_only_recognized_values() {
        assert_eq!(
            "ufed_extraction".parse::<DataSource>().ok(),
            Some(DataSource::UfedExtraction)
        );
        let err = "email".parse::<DataSource>().unwrap_err();
        assert_eq!(err.category(), "invalid_input");
        assert!(err.to_string().contains("audio, video, image, ufed_extraction, others"));
    }

    #[test]
    fn case_type_is_free_text_but_not_blank() {
        let custom = CaseType::parse("Wildlife Smuggling").unwrap();
        assert!(!custom.is_known());
        assert!(CaseType::parse("Cyber Crime").unwrap().is_known());
        assert!(CaseType::parse("   ").is_err());
    }

    #[test]
    fn response_omits_absent_counters() {
        let request = InsightsRequest {
            case_id: "c1".into(),
            file_id: "f1".into(),
            case_type: "General".into(),
            data_source: "audio".into(),
        };
        let response =
            InsightsResponse::new(request, InsightResult::existing("Summary: ok".into()));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["source"], "existing");
        assert_eq!(json["used_summarization"], false);
        assert!(json.get("num_summary_chunks").is_none());
        assert!(json.get("total_tokens").is_none());
    }
}
