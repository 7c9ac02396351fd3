// src/storage/memory.rs

//! In-process store for dry runs and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use super::{DedupGateway, InsertOutcome, RunLedger};
use crate::registry::models::{NormalizedRecord, RunOutcome, RunRecord, RunSummary};
use crate::utils::error::{bounded_message, StorageError};

#[derive(Default)]
struct Inner {
    records: Vec<NormalizedRecord>,
    index: HashMap<String, usize>,
    runs: Vec<RunRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored records in insertion order.
    #[cfg(test)]
    pub fn records(&self) -> Vec<NormalizedRecord> {
        self.inner.lock().map(|inner| inner.records.clone()).unwrap_or_default()
    }

    #[cfg(test)]
    pub fn runs(&self) -> Vec<RunRecord> {
        self.inner.lock().map(|inner| inner.runs.clone()).unwrap_or_default()
    }
}

impl DedupGateway for MemoryStore {
    fn exists(&self, identity_hash: &str) -> Result<bool, StorageError> {
        let inner = self.inner.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(inner.index.contains_key(identity_hash))
    }

    fn insert(&self, record: &NormalizedRecord) -> Result<InsertOutcome, StorageError> {
        let mut inner = self.inner.lock().map_err(|_| StorageError::Poisoned)?;
        if inner.index.contains_key(&record.identity_hash) {
            return Ok(InsertOutcome::Duplicate);
        }
        let position = inner.records.len();
        inner.index.insert(record.identity_hash.clone(), position);
        inner.records.push(record.clone());
        Ok(InsertOutcome::Inserted)
    }
}

impl RunLedger for MemoryStore {
    fn begin(&self) -> Result<i64, StorageError> {
        let mut inner = self.inner.lock().map_err(|_| StorageError::Poisoned)?;
        let id = inner.runs.len() as i64 + 1;
        inner.runs.push(RunRecord::started(id, Utc::now()));
        Ok(id)
    }

    fn complete(&self, run_id: i64, summary: &RunSummary) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().map_err(|_| StorageError::Poisoned)?;
        let run = inner
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or(StorageError::UnknownRun(run_id))?;

        if run.finished_at.is_some() {
            tracing::warn!("Run {} was already completed; outcome left unchanged", run_id);
            return Ok(());
        }
        run.finished_at = Some(Utc::now());
        run.outcome = summary.outcome;
        run.pages_parsed = summary.pages_parsed;
        run.records_found = summary.records_found;
        run.records_new = summary.records_new;
        run.error_message = summary.error_message.as_deref().map(bounded_message);
        Ok(())
    }

    fn run(&self, run_id: i64) -> Result<Option<RunRecord>, StorageError> {
        let inner = self.inner.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(inner.runs.iter().find(|r| r.id == run_id).cloned())
    }

    fn orphaned_runs(&self) -> Result<u64, StorageError> {
        let inner = self.inner.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(inner.runs.iter().filter(|r| r.outcome == RunOutcome::Running).count() as u64)
    }
}
