// src/extractors/identity.rs
use sha2::{Digest, Sha256};

const FIELD_SEPARATOR: char = '|';

/// Stable deduplication key for a record.
///
/// Each field has its whitespace collapsed; the joined triple is trimmed
/// and lowercased before hashing, so casing and spacing never split a
/// record into two identities. Absent fields contribute an empty string.
pub fn compute_identity(
    lot_number: Option<&str>,
    announce_number: Option<&str>,
    record_name: Option<&str>,
) -> String {
    let joined = [lot_number, announce_number, record_name]
        .into_iter()
        .map(|field| collapse_whitespace(field.unwrap_or_default()))
        .collect::<Vec<_>>()
        .join(&FIELD_SEPARATOR.to_string());

    let normalized = joined.trim().to_lowercase();

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
