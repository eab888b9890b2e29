use anyhow::Result;
use clap::{Parser, Subcommand};
use dashboard_insights::api::{self, ApiState};
use dashboard_insights::config::Settings;
use dashboard_insights::observability::init_tracing;
use dashboard_insights::pipeline::{Capabilities, InsightPipeline, PipelineOptions};
use dashboard_insights::sql_guard;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "dashboard-insights")]
#[command(about = "SQL and natural-language insights for BI dashboards")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate, validate and run an insight query for a dashboard
    Insights {
        dashboard_id: i64,

        /// Optional analyst question to steer generation
        #[arg(short, long)]
        question: Option<String>,
    },

    /// Refresh the vector index with a dashboard's documents
    Ingest { dashboard_id: i64 },

    /// Check a SQL statement against the read-only guard
    Validate { sql: String },

    /// Start the HTTP API
    Serve {
        /// Listen address (default: SERVER_ADDR)
        #[arg(long)]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Validation needs no external services or settings
    if let Command::Validate { sql } = &args.command {
        let verdict = sql_guard::validate(sql);
        println!("{}", serde_json::to_string_pretty(&verdict)?);
        if !verdict.valid {
            std::process::exit(1);
        }
        return Ok(());
    }

    let settings = Settings::from_env()?;
    init_tracing(&settings.log_level);

    let capabilities = Capabilities::init(&settings).await?;
    let pipeline = Arc::new(InsightPipeline::new(&capabilities, PipelineOptions::from(&settings)));

    let outcome = run_command(args.command, pipeline, &settings).await;

    capabilities.shutdown().await;
    info!("Done");
    outcome
}

async fn run_command(command: Command, pipeline: Arc<InsightPipeline>, settings: &Settings) -> Result<()> {
    match command {
        Command::Insights {
            dashboard_id,
            question,
        } => {
            let response = pipeline.run(dashboard_id, question.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Ingest { dashboard_id } => {
            let report = pipeline.ingest_dashboard(dashboard_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| settings.server_addr.clone());
            api::start_server(&addr, ApiState { pipeline }).await?;
        }
        Command::Validate { sql } => {
            println!("{}", serde_json::to_string_pretty(&sql_guard::validate(&sql))?);
        }
    }
    Ok(())
}
