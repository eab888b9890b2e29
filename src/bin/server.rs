//! HTTP server for the insights API

use dashboard_insights::api::{self, ApiState};
use dashboard_insights::config::Settings;
use dashboard_insights::observability::init_tracing;
use dashboard_insights::pipeline::{Capabilities, InsightPipeline, PipelineOptions};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    init_tracing(&settings.log_level);

    info!("Starting insights API server...");
    let capabilities = Capabilities::init(&settings).await?;
    let pipeline = Arc::new(InsightPipeline::new(&capabilities, PipelineOptions::from(&settings)));

    let served = api::start_server(&settings.server_addr, ApiState { pipeline }).await;
    capabilities.shutdown().await;
    served
}
