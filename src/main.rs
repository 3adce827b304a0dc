use anyhow::Result;
use tracing_subscriber::EnvFilter;

use insights::service::InsightsService;
use insights::{run_server, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    tracing::info!(
        "summarization budgets: threshold={} chunk={} mega={} insights={}",
        config.summarization.max_tokens_before_summarization,
        config.summarization.chunk_size_for_summarization,
        config.summarization.mega_summary_target,
        config.summarization.insights_max_output_tokens
    );

    let service = InsightsService::from_config(&config)?;
    run_server(config, service).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
