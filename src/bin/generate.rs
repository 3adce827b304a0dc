use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use insights::config::AppConfig;
use insights::models::{InsightsRequest, InsightsResponse};
use insights::service::InsightsService;

#[derive(Parser, Debug)]
#[command(name = "generate")]
#[command(about = "Generate or retrieve insights for one indexed file")]
struct Cli {
    #[arg(long)]
    case_id: String,
    #[arg(long)]
    file_id: String,
    #[arg(long)]
    case_type: String,
    #[arg(long)]
    data_source: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::from_env();
    let service = InsightsService::from_config(&config)?;

    let request = InsightsRequest {
        case_id: cli.case_id,
        file_id: cli.file_id,
        case_type: cli.case_type,
        data_source: cli.data_source,
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let result = service.generate_or_retrieve(&request, &cancel).await?;
    let response = InsightsResponse::new(request, result);
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
