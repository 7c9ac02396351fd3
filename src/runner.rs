// src/runner.rs

//! One pipeline execution end to end, and the schedule that repeats it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use crate::config::PipelineConfig;
use crate::extractors::Layout;
use crate::registry::models::{RunOutcome, RunSummary};
use crate::registry::pipeline::ExtractionPipeline;
use crate::registry::renderer::Renderer;
use crate::storage::{DedupGateway, InsertOutcome, RunLedger};
use crate::utils::AppError;

const PROGRESS_EVERY: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: i64,
    pub summary: RunSummary,
}

/// Executes one run: opens a renderer session, walks every page, stores new
/// records and closes the ledger entry.
///
/// The ledger entry is completed on every path. A run that fails is
/// recorded as `failed` and its error is returned.
pub async fn run_once<R, St>(
    config: &PipelineConfig,
    layout: &Layout,
    renderer: &R,
    store: &St,
) -> Result<RunReport, AppError>
where
    R: Renderer,
    St: DedupGateway + RunLedger,
{
    let run_id = store.begin()?;
    tracing::info!("Run {} started (layout {})", run_id, layout.version);

    let session = match renderer.open().await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Run {}: renderer unavailable: {}", run_id, e);
            let summary = RunSummary {
                outcome: RunOutcome::Failed,
                pages_parsed: 0,
                records_found: 0,
                records_new: 0,
                error_message: Some(e.to_string()),
            };
            finish(store, run_id, &summary);
            return Err(e.into());
        }
    };

    let mut pipeline = ExtractionPipeline::new(session, config.clone(), layout.clone());
    let mut records_found = 0u64;
    let mut records_new = 0u64;
    let mut failure: Option<AppError> = None;

    loop {
        let record = match pipeline.next_record().await {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) => {
                failure = Some(e.into());
                break;
            }
        };
        records_found += 1;

        let outcome = match store.exists(&record.identity_hash) {
            Ok(true) => Ok(InsertOutcome::Duplicate),
            // A concurrent writer may still win the race; insert reports that as a duplicate
            Ok(false) => store.insert(&record),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(InsertOutcome::Inserted) => {
                records_new += 1;
                if records_new % PROGRESS_EVERY == 0 {
                    tracing::info!("  New records stored: {} (processed: {})", records_new, records_found);
                }
            }
            Ok(InsertOutcome::Duplicate) => {
                tracing::trace!("Duplicate record {}", record.identity_hash);
            }
            Err(e) => {
                failure = Some(e.into());
                break;
            }
        }
    }

    let pages_parsed = pipeline.pages_parsed();
    let pages_failed = pipeline.pages_failed();
    pipeline.close().await;

    let summary = RunSummary {
        outcome: if failure.is_some() { RunOutcome::Failed } else { RunOutcome::Success },
        pages_parsed,
        records_found,
        records_new,
        error_message: failure.as_ref().map(|e| e.to_string()),
    };
    finish(store, run_id, &summary);

    match failure {
        Some(e) => {
            tracing::error!(
                "Run {} failed after {} page(s), {} record(s) ({} new): {}",
                run_id,
                pages_parsed,
                records_found,
                records_new,
                e
            );
            Err(e)
        }
        None => {
            tracing::info!(
                "Run {} finished: pages={} (failed {}), found={}, new={}",
                run_id,
                pages_parsed,
                pages_failed,
                records_found,
                records_new
            );
            Ok(RunReport { run_id, summary })
        }
    }
}

fn finish<St: RunLedger>(store: &St, run_id: i64, summary: &RunSummary) {
    if let Err(e) = store.complete(run_id, summary) {
        tracing::error!("Failed to record outcome of run {}: {}", run_id, e);
        return;
    }
    match store.run(run_id) {
        Ok(Some(run)) => {
            let took = run.finished_at.map(|end| (end - run.started_at).num_seconds()).unwrap_or(0);
            tracing::info!("Run {} recorded as {} ({}s)", run_id, run.outcome.as_str(), took);
        }
        Ok(None) => tracing::warn!("Run {} missing from the ledger after completion", run_id),
        Err(e) => tracing::warn!("Could not read back run {}: {}", run_id, e),
    }
}

/// Runs immediately, then every `every`, until `shutdown` resolves.
///
/// A trigger that fires while a run is still in progress is skipped. Failed
/// runs are logged and the schedule carries on. On shutdown the in-flight
/// run, if any, is allowed to finish.
pub async fn run_scheduled<R, St>(
    config: PipelineConfig,
    layout: Layout,
    renderer: Arc<R>,
    store: Arc<St>,
    every: Duration,
    shutdown: impl Future<Output = ()>,
) -> Result<(), AppError>
where
    R: Renderer + 'static,
    R::Session: 'static,
    St: DedupGateway + RunLedger + 'static,
{
    let config = Arc::new(config);
    let layout = Arc::new(layout);
    let in_flight = Arc::new(Mutex::new(()));

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    tracing::info!("Scheduler started: every {:?}", every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Ok(permit) = in_flight.clone().try_lock_owned() else {
                    tracing::warn!("Previous run still in progress; skipping this trigger");
                    continue;
                };

                let config = config.clone();
                let layout = layout.clone();
                let renderer = renderer.clone();
                let store = store.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    // The error is already in the ledger and the log
                    let _ = run_once(&config, &layout, renderer.as_ref(), store.as_ref()).await;
                });
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested; waiting for the current run to finish");
                break;
            }
        }
    }

    let _idle = in_flight.lock().await;
    tracing::info!("Scheduler stopped");
    Ok(())
}
