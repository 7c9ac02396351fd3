mod config;
mod extractors;
mod registry;
mod runner;
mod storage;
mod utils;

use std::sync::Arc;

use clap::Parser;
use config::Args;
use registry::browser::BrowserRenderer;
use storage::{DedupGateway, MemoryStore, RunLedger, SqliteStore};
use utils::AppError;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load .env before clap reads env-backed options
    let _ = dotenvy::dotenv();

    // 2. Parse CLI Arguments and set up logging
    let args = Args::parse();
    utils::logging::setup_logging(&args.log_level);
    tracing::info!("Starting with args: {:?}", args);

    // 3. Resolve configuration up front; nothing runs on a bad config
    let pipeline_config = args.pipeline_config()?;
    let layout = args.layout()?;
    tracing::info!("Layout profile: {}", layout.version);
    if let Some(dir) = &pipeline_config.debug_dir {
        std::fs::create_dir_all(dir)?;
    }

    // 4. Initialize storage
    if args.dry_run {
        tracing::warn!("Dry run: records are kept in memory and discarded on exit");
        serve(&args, pipeline_config, layout, Arc::new(MemoryStore::new())).await
    } else {
        let store = SqliteStore::new(&args.database)?;
        match store.count_lots() {
            Ok(n) => tracing::info!("Database: {} ({} lots stored)", store.path().display(), n),
            Err(e) => tracing::warn!("Database: {} (lot count unavailable: {})", store.path().display(), e),
        }
        serve(&args, pipeline_config, layout, Arc::new(store)).await
    }
}

async fn serve<St>(
    args: &Args,
    pipeline_config: config::PipelineConfig,
    layout: extractors::Layout,
    store: Arc<St>,
) -> Result<(), AppError>
where
    St: DedupGateway + RunLedger + 'static,
{
    match store.orphaned_runs() {
        Ok(0) => {}
        Ok(n) => tracing::warn!("{} earlier run(s) never completed and remain marked running", n),
        Err(e) => tracing::warn!("Could not check for unfinished runs: {}", e),
    }

    let renderer = Arc::new(BrowserRenderer::new(args.browser_settings()));

    // 5. Single run, or the periodic schedule
    if args.run_once {
        let report = runner::run_once(&pipeline_config, &layout, renderer.as_ref(), store.as_ref()).await?;
        tracing::info!(
            "Done: {} page(s), {} record(s) found, {} new",
            report.summary.pages_parsed,
            report.summary.records_found,
            report.summary.records_new
        );
        return Ok(());
    }

    let every = args.run_interval()?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };
    runner::run_scheduled(pipeline_config, layout, renderer, store, every, shutdown).await
}
