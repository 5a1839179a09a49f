//! # NewsDigest — Scheduled News Summary Daemon
//!
//! Runs the news summary pipeline on a windowed schedule.
//!
//! Usage:
//!   newsdigest                               # Run the scheduler until Ctrl-C
//!   newsdigest --config ./newsdigest.toml    # Custom config file
//!   newsdigest --run-once news_summary       # Trigger one task, print its status, exit

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use clap::Parser;
use newsdigest_core::config::DigestConfig;
use newsdigest_pipeline::{NewsPipeline, PipelineApiClient, register_default_tasks};
use newsdigest_scheduler::SchedulerService;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "newsdigest",
    version,
    about = "📰 NewsDigest — windowed scheduler for news summary pipelines"
)]
struct Cli {
    /// Config file (default: ~/.newsdigest/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Trigger this task once, print its status as JSON and exit
    #[arg(long, value_name = "TASK_ID")]
    run_once: Option<String>,

    /// License end, overrides [license].end_datetime (e.g. 2026-12-31T23:59:59)
    #[arg(long)]
    license_end: Option<NaiveDateTime>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(path: Option<&str>) -> Result<DigestConfig> {
    let config = match path {
        Some(p) => {
            let path = PathBuf::from(shellexpand::tilde(p).to_string());
            DigestConfig::load_from(&path)
                .with_context(|| format!("loading {}", path.display()))?
        }
        None => DigestConfig::load()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "newsdigest=debug,newsdigest_scheduler=debug,newsdigest_pipeline=debug"
    } else {
        "newsdigest=info,newsdigest_scheduler=info,newsdigest_pipeline=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;

    let client = Arc::new(PipelineApiClient::new(&config.api)?);
    let pipeline = Arc::new(NewsPipeline::new(client, config.pipeline.clone()));
    let service = SchedulerService::new(config.scheduler.clone());
    let task_ids = register_default_tasks(&service, &config, pipeline)?;
    tracing::info!("📋 Registered tasks: {}", task_ids.join(", "));

    if let Some(task_id) = cli.run_once {
        let outcome = service.start_task(&task_id).await;
        let info = service.get_task_info(&task_id)?;
        println!("{}", serde_json::to_string_pretty(&info)?);
        outcome?;
        return Ok(());
    }

    let license_end = cli
        .license_end
        .or(config.license.end_datetime)
        .context("no license end configured: set [license].end_datetime or pass --license-end")?;
    let license_start = config
        .license
        .start_datetime
        .unwrap_or_else(|| Local::now().naive_local());

    service.start_service(license_start, license_end)?;
    println!("📰 NewsDigest running ({} tasks). Press Ctrl-C to stop.", task_ids.len());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    service.stop_service();

    let metrics = service.metrics();
    tracing::info!(
        "📊 Executed: {}, failed: {}, average: {:.2}s",
        metrics.tasks_executed,
        metrics.tasks_failed,
        metrics.average_execution_time
    );
    Ok(())
}
