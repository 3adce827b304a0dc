use std::fmt;

use thiserror::Error;

/// Remote collaborator that produced an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamService {
    LanguageModel,
    Embedding,
    VectorStore,
}

impl fmt::Display for UpstreamService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpstreamService::LanguageModel => "language model",
            UpstreamService::Embedding => "embedding service",
            UpstreamService::VectorStore => "vector store",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamReason {
    Timeout,
    Connection,
    Status,
    MalformedResponse,
    GenerationFailed,
}

impl fmt::Display for UpstreamReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpstreamReason::Timeout => "timed out",
            UpstreamReason::Connection => "connection failed",
            UpstreamReason::Status => "returned non-success status",
            UpstreamReason::MalformedResponse => "returned a malformed response",
            UpstreamReason::GenerationFailed => "reported an unsuccessful result",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum InsightsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{service} {reason}: {detail}")]
    Upstream {
        service: UpstreamService,
        reason: UpstreamReason,
        detail: String,
    },

    #[error("insight generation was cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = InsightsError> = std::result::Result<T, E>;

impl InsightsError {
    pub fn upstream(
        service: UpstreamService,
        reason: UpstreamReason,
        detail: impl Into<String>,
    ) -> Self {
        InsightsError::Upstream {
            service,
            reason,
            detail: detail.into(),
        }
    }

    /// Classifies a transport-level reqwest failure.
    pub fn from_transport(service: UpstreamService, err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            UpstreamReason::Timeout
        } else if err.is_decode() {
            UpstreamReason::MalformedResponse
        } else if err.is_status() {
            UpstreamReason::Status
        } else {
            UpstreamReason::Connection
        };
        Self::upstream(service, reason, err.to_string())
    }

    pub fn category(&self) -> &'static str {
        match self {
            InsightsError::InvalidInput(_) => "invalid_input",
            InsightsError::NotFound(_) => "not_found",
            InsightsError::Upstream { .. } => "upstream_error",
            InsightsError::Cancelled => "cancelled",
            InsightsError::Internal(_) => "internal_error",
        }
    }
}
