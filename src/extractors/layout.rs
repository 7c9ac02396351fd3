// src/extractors/layout.rs

//! Site-specific layout knowledge kept as versioned data.
//!
//! Header synonyms, the positional column table and the marker strings used
//! to find the result table change whenever the registry redeploys, so they
//! are loaded from a JSON profile instead of living in code. The profile
//! shipped in `layouts/goszakup.json` is embedded as the default.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::utils::error::ExtractError;

const BUILTIN_PROFILE: &str = include_str!("../../layouts/goszakup.json");

/// Logical columns a result row can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Sequence,
    LotNumber,
    AnnounceNumber,
    AnnounceName,
    RecordName,
    SubjectType,
    Quantity,
    Status,
    PurchaseMethod,
    CustomerName,
    PurchaseAmount,
    DeadlineDate,
    PublicationDate,
    FinancialYear,
    DeliveryPlace,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeaderSynonyms {
    pub field: Field,
    pub synonyms: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ColumnBinding {
    pub field: Field,
    pub index: usize,
}

/// Raw, deserialized profile.
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutProfile {
    pub version: String,
    pub table_markers: Vec<String>,
    pub min_cells: usize,
    pub header_synonyms: Vec<HeaderSynonyms>,
    pub positional: Vec<ColumnBinding>,
    pub announce_link_pattern: String,
    pub record_link_pattern: String,
    pub customer_labels: Vec<String>,
}

/// A validated profile with its patterns compiled.
#[derive(Debug, Clone)]
pub struct Layout {
    pub version: String,
    pub table_markers: Vec<String>,
    pub min_cells: usize,
    header_synonyms: Vec<(Field, Vec<String>)>,
    pub positional: Vec<ColumnBinding>,
    pub announce_link: Regex,
    pub record_link: Regex,
    pub customer_label: Regex,
}

impl Layout {
    /// The profile embedded at build time.
    pub fn builtin() -> Result<Self, ExtractError> {
        Self::from_json(BUILTIN_PROFILE)
    }

    pub fn from_file(path: &Path) -> Result<Self, ExtractError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ExtractError::InvalidLayout(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ExtractError> {
        let profile: LayoutProfile = serde_json::from_str(raw)
            .map_err(|e| ExtractError::InvalidLayout(e.to_string()))?;
        Self::compile(profile)
    }

    pub fn compile(profile: LayoutProfile) -> Result<Self, ExtractError> {
        if profile.table_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(ExtractError::InvalidLayout("table_markers must not be empty".into()));
        }
        if profile.customer_labels.is_empty() {
            return Err(ExtractError::InvalidLayout("customer_labels must not be empty".into()));
        }

        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| ExtractError::RegexError(format!("'{}': {}", pattern, e)))
        };

        let labels = profile
            .customer_labels
            .iter()
            .map(|l| regex::escape(l.trim()))
            .collect::<Vec<_>>()
            .join("|");
        // Value is the rest of the line following the label
        let customer_label = compile(&format!(r"(?i)(?:{})\s*(.+)", labels))?;

        Ok(Self {
            version: profile.version,
            table_markers: profile.table_markers,
            min_cells: profile.min_cells,
            header_synonyms: profile
                .header_synonyms
                .into_iter()
                .map(|h| (h.field, h.synonyms.iter().map(|s| s.to_lowercase()).collect()))
                .collect(),
            positional: profile.positional,
            announce_link: compile(&profile.announce_link_pattern)?,
            record_link: compile(&profile.record_link_pattern)?,
            customer_label,
        })
    }

    /// Fuzzy header match: first field with a synonym contained in the header text.
    pub fn match_header(&self, header: &str) -> Option<Field> {
        let header = header.to_lowercase();
        if header.trim().is_empty() {
            return None;
        }
        self.header_synonyms
            .iter()
            .find(|(_, synonyms)| synonyms.iter().any(|s| header.contains(s.as_str())))
            .map(|(field, _)| *field)
    }
}
