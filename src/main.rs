//! batchenc
//!
//! Keeps a cloud encoding platform's queue filled with a fixed batch of
//! encodings, retrying failed ones within a budget, until every encoding has
//! finished or been given up.
//!
//! - Configuration: layered lookup (command line, local file, environment, home file)
//! - Platform: REST adapter behind the `RemoteJobClient` trait
//! - Dispatcher and state machine: per-job status and retry bookkeeping
//! - Orchestrator: the pass loop (count, start, pause, poll)

mod batch;
mod cli;
mod config;
mod dispatcher;
mod encoding;
mod error;
mod orchestrator;
mod pacer;
mod platform;
mod report;
mod state_machine;
mod ui;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::batch::BatchDefinition;
use crate::cli::{Cli, Command};
use crate::config::{
    API_KEY, BatchConfig, BatchSettings, ConfigProvider, HTTP_INPUT_FILE_PATH,
    S3_OUTPUT_BASE_PATH, normalize_base_path,
};
use crate::dispatcher::JobDispatcher;
use crate::encoding::{EncodingJobClient, EncodingTemplate, Rendition};
use crate::orchestrator::BatchOrchestrator;
use crate::pacer::TokioPacer;
use crate::platform::PlatformClient;
use crate::report::BatchReport;
use crate::state_machine::RetryPolicy;
use crate::ui::BatchProgress;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "batchenc=debug"
    } else {
        "batchenc=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let provider =
        ConfigProvider::load(cli.config_overrides()).context("Failed to load configuration")?;

    match cli.command {
        Command::Run { file, report } => run(&provider, file.as_deref(), report.as_deref()).await,
        Command::Plan { file } => plan(&provider, file.as_deref()),
    }
}

async fn run(provider: &ConfigProvider, file: Option<&Path>, report_path: Option<&Path>) -> Result<()> {
    let config = BatchConfig::resolve(provider).context("Failed to resolve configuration")?;
    debug!(
        platform = ?config.platform,
        output = ?config.output,
        api_key_source = provider.source_of(API_KEY).unwrap_or("-"),
        "Loaded configuration"
    );

    let batch = load_batch(
        file,
        &config.input.file_path,
        config.batch.number_of_encodings,
    )?;
    info!(
        jobs = batch.len(),
        target_queue_size = config.batch.target_queue_size,
        max_retries = config.batch.max_retries,
        "Starting batch"
    );

    let client = PlatformClient::with_base_url(
        config.platform.api_key.clone(),
        config.platform.api_url.clone(),
    )?
    .with_tenant_org_id(config.platform.tenant_org_id.clone());
    debug!("Using encoding API at {}", client.base_url());

    let template = EncodingTemplate::prepare(&client, &config, &Rendition::default_ladder())
        .await
        .context("Failed to create the shared input, output and codec configurations")?;

    let mut dispatcher = JobDispatcher::new(
        batch,
        RetryPolicy {
            max_retries: config.batch.max_retries,
        },
    );
    let orchestrator = BatchOrchestrator::new(
        EncodingJobClient::new(client, template),
        TokioPacer,
        config.batch.clone(),
    );

    let started_at = Utc::now();
    let progress = BatchProgress::start(dispatcher.jobs().len());
    orchestrator
        .run(&mut dispatcher, |summary| progress.update(summary))
        .await;
    progress.finish();

    let report = BatchReport::from_dispatcher(&dispatcher, started_at);
    progress.print_report(&report);

    if let Some(path) = report_path {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }
    Ok(())
}

fn plan(provider: &ConfigProvider, file: Option<&Path>) -> Result<()> {
    let settings = BatchSettings::resolve(provider).context("Failed to resolve configuration")?;
    let input_path = match file {
        Some(_) => provider.get(HTTP_INPUT_FILE_PATH).unwrap_or_default(),
        None => provider.require(HTTP_INPUT_FILE_PATH)?,
    };
    let batch = load_batch(file, input_path, settings.number_of_encodings)?;
    let base_path = normalize_base_path(provider.get(S3_OUTPUT_BASE_PATH).unwrap_or_default());

    ui::print_plan(batch.jobs(), &Rendition::default_ladder(), &base_path);
    Ok(())
}

/// The batch from `file`, or `count` generated jobs over `input_path`.
fn load_batch(file: Option<&Path>, input_path: &str, count: usize) -> Result<BatchDefinition> {
    let batch = match file {
        Some(path) => BatchDefinition::load(path)
            .with_context(|| format!("Failed to load batch from {}", path.display()))?,
        None => BatchDefinition::generate(input_path, count)?,
    };
    Ok(batch)
}
