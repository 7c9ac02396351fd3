// src/storage/mod.rs

//! Persistence seams: record deduplication and the run ledger.

pub mod memory;
pub mod sqlite;

use crate::registry::models::{NormalizedRecord, RunRecord, RunSummary};
use crate::utils::error::StorageError;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same identity hash is already stored.
    Duplicate,
}

/// Admits each identity hash at most once.
pub trait DedupGateway: Send + Sync {
    fn exists(&self, identity_hash: &str) -> Result<bool, StorageError>;

    /// Stores the record unless its identity is already known. The check and
    /// the write are atomic: concurrent callers never both see `Inserted`.
    fn insert(&self, record: &NormalizedRecord) -> Result<InsertOutcome, StorageError>;
}

/// Audit trail of pipeline executions.
pub trait RunLedger: Send + Sync {
    /// Opens a `running` entry stamped with the current time.
    fn begin(&self) -> Result<i64, StorageError>;

    /// Writes the terminal outcome. Called at most once per run.
    fn complete(&self, run_id: i64, summary: &RunSummary) -> Result<(), StorageError>;

    fn run(&self, run_id: i64) -> Result<Option<RunRecord>, StorageError>;

    /// Runs still marked `running`, left behind by a process that died.
    fn orphaned_runs(&self) -> Result<u64, StorageError>;
}
