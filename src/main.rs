// ==============================================================================
// main.rs - Variant Fan-out Entry Point
// ==============================================================================
// Description: Loads the run configuration and drives one resumable pipeline
//              run over the configured input
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2025-12-06
// Version: 2.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use variant_fanout::annotation::HttpAnnotator;
use variant_fanout::audit::{self, AuditEventType};
use variant_fanout::config::RunConfiguration;
use variant_fanout::parsers::open_input;
use variant_fanout::processor::Pipeline;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run configuration file (JSON)
    #[arg(short, long, env = "VARIANT_FANOUT_CONFIG", default_value = "configurations.json")]
    config: PathBuf,

    /// Override the output directory from the configuration
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "variant_fanout=info,audit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Variant fan-out starting...");

    let args = Args::parse();

    let mut config = RunConfiguration::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }

    let annotator = HttpAnnotator::new(
        config.api_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
    )
    .context("Failed to build annotation client")?;

    let mut pipeline = Pipeline::new(&config, annotator)?;
    let run_id = pipeline.run_id();

    audit::log_event(
        run_id,
        AuditEventType::RunStarted,
        serde_json::json!({
            "data_url": config.data_url,
            "limit": config.limit,
            "output_dir": config.output_dir,
        }),
    );

    let client = reqwest::Client::new();
    let result = match open_input(&config.data_url, &client).await {
        Ok(input) => pipeline.run(input).await.map_err(anyhow::Error::from),
        Err(e) => Err(anyhow::Error::from(e)),
    };

    match result {
        Ok(summary) => {
            info!("Processing completed successfully");

            audit::log_event(
                run_id,
                AuditEventType::RunCompleted,
                serde_json::json!({
                    "summary": summary,
                    "success": true,
                }),
            );

            Ok(())
        }
        Err(e) => {
            warn!("Processing failed: {:#}", e);

            audit::log_event(
                run_id,
                AuditEventType::RunFailed,
                serde_json::json!({
                    "error": format!("{:#}", e),
                    "success": false,
                }),
            );

            Err(e).context("Run aborted; checkpoint and outputs are kept for resume")
        }
    }
}
