// src/registry/models.rs
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;

/// One procurement lot in canonical form.
///
/// Built once per table row and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub identity_hash: String,
    pub lot_number: Option<String>,
    pub announce_number: Option<String>,
    pub announce_name: Option<String>,
    pub record_name: Option<String>,
    pub subject_type: Option<String>,
    pub quantity: Option<String>,
    pub status: Option<String>,
    pub purchase_method: Option<String>,
    pub customer_name: Option<String>,
    pub customer_tax_id: Option<String>,
    pub purchase_amount: Option<Decimal>, // KZT, at least two fractional digits
    pub deadline_date: Option<NaiveDateTime>,
    pub publication_date: Option<NaiveDateTime>,
    pub financial_year: Option<i32>,
    pub delivery_place: Option<String>,
    pub source_url: Option<String>,
    /// JSON copy of the raw cell texts the record was built from.
    pub raw_snapshot: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Running,
    Success,
    Failed,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Running => "running",
            RunOutcome::Success => "success",
            RunOutcome::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunOutcome::Running),
            "success" => Some(RunOutcome::Success),
            "failed" => Some(RunOutcome::Failed),
            _ => None,
        }
    }
}

/// Terminal figures reported to the run ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub pages_parsed: u32,
    pub records_found: u64,
    pub records_new: u64,
    pub error_message: Option<String>,
}

/// Audit entry for one pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: RunOutcome,
    pub pages_parsed: u32,
    pub records_found: u64,
    pub records_new: u64,
    pub error_message: Option<String>,
}

impl RunRecord {
    pub fn started(id: i64, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at,
            finished_at: None,
            outcome: RunOutcome::Running,
            pages_parsed: 0,
            records_found: 0,
            records_new: 0,
            error_message: None,
        }
    }
}

/// Rendered content of one result page; consumed immediately, never stored.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub page: u32,
    pub url: String,
    pub content: String,
}
