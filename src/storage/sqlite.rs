// src/storage/sqlite.rs

//! SQLite-backed record store and run ledger.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{DedupGateway, InsertOutcome, RunLedger};
use crate::registry::models::{NormalizedRecord, RunOutcome, RunRecord, RunSummary};
use crate::utils::error::{bounded_message, StorageError};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `db_path`.
    pub fn new(db_path: &Path) -> Result<Self, StorageError> {
        let store = Self { db_path: db_path.to_path_buf() };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection, StorageError> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS lots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                unique_hash TEXT NOT NULL UNIQUE,
                lot_number TEXT,
                announce_number TEXT,
                announce_name TEXT,
                lot_name TEXT,
                subject_type TEXT,
                quantity TEXT,
                status TEXT,
                purchase_method TEXT,
                customer_name TEXT,
                customer_bin TEXT,
                purchase_amount TEXT,
                deadline_date TEXT,
                publication_date TEXT,
                financial_year INTEGER,
                delivery_place TEXT,
                lot_url TEXT,
                raw_data TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS ix_lot_number ON lots(lot_number);
            CREATE INDEX IF NOT EXISTS ix_announce_number ON lots(announce_number);
            CREATE INDEX IF NOT EXISTS ix_status ON lots(status);
            CREATE INDEX IF NOT EXISTS ix_publication_date ON lots(publication_date);
            CREATE INDEX IF NOT EXISTS ix_customer_bin ON lots(customer_bin);
            CREATE INDEX IF NOT EXISTS ix_created_at ON lots(created_at);
            CREATE INDEX IF NOT EXISTS ix_purchase_method ON lots(purchase_method);

            CREATE TABLE IF NOT EXISTS parse_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                status TEXT NOT NULL DEFAULT 'running',
                pages_parsed INTEGER NOT NULL DEFAULT 0,
                lots_found INTEGER NOT NULL DEFAULT 0,
                lots_new INTEGER NOT NULL DEFAULT 0,
                error_message TEXT
            );

            CREATE INDEX IF NOT EXISTS ix_parse_runs_started_at ON parse_runs(started_at);
        "#,
        )?;
        Ok(())
    }

    /// Number of stored lots.
    pub fn count_lots(&self) -> Result<u64, StorageError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM lots", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn format_date(date: Option<NaiveDateTime>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

impl DedupGateway for SqliteStore {
    fn exists(&self, identity_hash: &str) -> Result<bool, StorageError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM lots WHERE unique_hash = ?",
            params![identity_hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn insert(&self, record: &NormalizedRecord) -> Result<InsertOutcome, StorageError> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();

        // The UNIQUE constraint arbitrates between concurrent writers
        let changed = conn.execute(
            r#"
            INSERT INTO lots (
                unique_hash, lot_number, announce_number, announce_name, lot_name,
                subject_type, quantity, status, purchase_method, customer_name, customer_bin,
                purchase_amount, deadline_date, publication_date, financial_year,
                delivery_place, lot_url, raw_data, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?19)
            ON CONFLICT(unique_hash) DO NOTHING
            "#,
            params![
                record.identity_hash,
                record.lot_number,
                record.announce_number,
                record.announce_name,
                record.record_name,
                record.subject_type,
                record.quantity,
                record.status,
                record.purchase_method,
                record.customer_name,
                record.customer_tax_id,
                record.purchase_amount.map(|a| a.to_string()),
                format_date(record.deadline_date),
                format_date(record.publication_date),
                record.financial_year,
                record.delivery_place,
                record.source_url,
                record.raw_snapshot,
                now,
            ],
        )?;

        Ok(if changed == 0 { InsertOutcome::Duplicate } else { InsertOutcome::Inserted })
    }
}

impl RunLedger for SqliteStore {
    fn begin(&self) -> Result<i64, StorageError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO parse_runs (started_at, status) VALUES (?1, ?2)",
            params![Utc::now().to_rfc3339(), RunOutcome::Running.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn complete(&self, run_id: i64, summary: &RunSummary) -> Result<(), StorageError> {
        let conn = self.connect()?;
        let changed = conn.execute(
            r#"
            UPDATE parse_runs
            SET finished_at = ?1, status = ?2, pages_parsed = ?3,
                lots_found = ?4, lots_new = ?5, error_message = ?6
            WHERE id = ?7 AND finished_at IS NULL
            "#,
            params![
                Utc::now().to_rfc3339(),
                summary.outcome.as_str(),
                summary.pages_parsed,
                summary.records_found as i64,
                summary.records_new as i64,
                summary.error_message.as_deref().map(bounded_message),
                run_id,
            ],
        )?;

        if changed == 0 {
            let known: Option<i64> = conn
                .query_row("SELECT id FROM parse_runs WHERE id = ?", params![run_id], |row| row.get(0))
                .optional()?;
            if known.is_none() {
                return Err(StorageError::UnknownRun(run_id));
            }
            tracing::warn!("Run {} was already completed; outcome left unchanged", run_id);
        }
        Ok(())
    }

    fn run(&self, run_id: i64) -> Result<Option<RunRecord>, StorageError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM parse_runs WHERE id = ?")?;
        let record = stmt
            .query_row(params![run_id], |row| {
                let status: String = row.get("status")?;
                Ok(RunRecord {
                    id: row.get("id")?,
                    started_at: parse_timestamp(&row.get::<_, String>("started_at")?),
                    finished_at: row
                        .get::<_, Option<String>>("finished_at")?
                        .map(|s| parse_timestamp(&s)),
                    outcome: RunOutcome::parse(&status).unwrap_or(RunOutcome::Failed),
                    pages_parsed: row.get("pages_parsed")?,
                    records_found: row.get::<_, i64>("lots_found")? as u64,
                    records_new: row.get::<_, i64>("lots_new")? as u64,
                    error_message: row.get("error_message")?,
                })
            })
            .optional()?;
        Ok(record)
    }

    fn orphaned_runs(&self) -> Result<u64, StorageError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM parse_runs WHERE status = ?",
            params![RunOutcome::Running.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
