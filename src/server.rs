use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::InsightsError;
use crate::models::{DataSource, InsightsRequest, InsightsResponse, KNOWN_CASE_TYPES};
use crate::service::InsightsService;

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
struct AppState {
    service: InsightsService,
}

pub fn router(service: InsightsService) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/generate-insights", post(generate_insights))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { service })
}

pub async fn run_server(config: AppConfig, service: InsightsService) -> Result<()> {
    let app = router(service);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> Json<Value> {
    let data_sources: Vec<&str> = DataSource::ALL.iter().map(|s| s.as_str()).collect();
    Json(json!({
        "message": "Insights API is running",
        "version": SERVICE_VERSION,
        "endpoints": {
            "/generate-insights": "POST - Generate or retrieve insights for a file",
            "/health": "GET - Health check endpoint"
        },
        "common_case_types": KNOWN_CASE_TYPES,
        "supported_data_sources": data_sources,
    }))
}

async fn generate_insights(
    State(state): State<AppState>,
    payload: Result<Json<InsightsRequest>, JsonRejection>,
) -> Result<Json<InsightsResponse>, ApiError> {
    let Json(request) = payload.map_err(ApiError::from)?;

    // Dropping the handler future (client gone) cancels in-flight model calls.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let result = state
        .service
        .generate_or_retrieve(&request, &cancel)
        .await
        .map_err(|err| {
            tracing::error!(
                "insights request failed for file_id={}: {}",
                request.file_id,
                err
            );
            ApiError::from(err)
        })?;

    tracing::info!(
        "insights ready for file_id={} (source={:?})",
        request.file_id,
        result.source
    );
    Ok(Json(InsightsResponse::new(request, result)))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    match state.service.store().collection_count().await {
        Ok(collections) => Json(json!({
            "status": "healthy",
            "qdrant": "connected",
            "collections": collections,
        })),
        Err(err) => Json(json!({
            "status": "unhealthy",
            "error": err.to_string(),
        })),
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    category: &'static str,
    message: String,
}

impl From<InsightsError> for ApiError {
    fn from(value: InsightsError) -> Self {
        let status = match &value {
            InsightsError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            InsightsError::NotFound(_) => StatusCode::NOT_FOUND,
            InsightsError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            InsightsError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            InsightsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            category: value.category(),
            message: value.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self::from(InsightsError::InvalidInput(value.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({ "error": self.message, "category": self.category });
        (self.status, Json(body)).into_response()
    }
}
