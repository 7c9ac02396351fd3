// src/extractors/fields.rs

//! Total parsers turning raw cell text into typed values.
//! None of these fail: unparsable input yields `None`.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

static NON_AMOUNT_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\d,.]").expect("Failed to compile NON_AMOUNT_CHARS_RE"));

static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(20\d{2})\b").expect("Failed to compile YEAR_RE"));

// Registry taxpayer identifier (BIN/IIN): exactly twelve digits
static TAX_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{12})\b").expect("Failed to compile TAX_ID_RE"));

const DATE_TIME_FORMATS: &[&str] = &["%d.%m.%Y %H:%M", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%d.%m.%Y", "%Y-%m-%d"];

/// Whether zero and negative amounts count as values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AmountPolicy {
    /// Only amounts greater than zero are kept.
    #[default]
    Positive,
    /// Any parsable number is kept.
    Any,
}

/// Parses a money amount such as `"1 234 567,89"`.
///
/// Everything except digits, commas and periods is dropped, commas become
/// decimal points, and when several points remain all but the last are
/// treated as thousands separators.
pub fn parse_amount(text: &str, policy: AmountPolicy) -> Option<Decimal> {
    let cleaned = NON_AMOUNT_CHARS_RE.replace_all(text.trim(), "").replace(',', ".");
    let cleaned = cleaned.trim_end_matches('.').to_string();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match cleaned.rsplit_once('.') {
        Some((head, tail)) if head.contains('.') => format!("{}.{}", head.replace('.', ""), tail),
        _ => cleaned,
    };

    let mut value = Decimal::from_str(&normalized).ok()?;
    if policy == AmountPolicy::Positive && value <= Decimal::ZERO {
        return None;
    }
    if value.scale() < 2 {
        value.rescale(2);
    }
    Some(value)
}

/// Parses registry dates; `"-"` and empty text mean "no date".
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() || text == "-" {
        return None;
    }

    // Formats are tried in order: "dd.mm.yyyy HH:MM", "dd.mm.yyyy",
    // "yyyy-mm-dd HH:MM:SS", "yyyy-mm-dd"
    let with_time = |fmt: &str| NaiveDateTime::parse_from_str(text, fmt).ok();
    let date_only = |fmt: &str| {
        NaiveDate::parse_from_str(text, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    };

    with_time(DATE_TIME_FORMATS[0])
        .or_else(|| date_only(DATE_FORMATS[0]))
        .or_else(|| with_time(DATE_TIME_FORMATS[1]))
        .or_else(|| date_only(DATE_FORMATS[1]))
}

/// First standalone year token in 2000..=2099.
pub fn parse_year(text: &str) -> Option<i32> {
    YEAR_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// First standalone twelve-digit token.
pub fn extract_tax_id(text: &str) -> Option<String> {
    TAX_ID_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn amount_with_spaces_and_comma() {
        assert_eq!(parse_amount("1 234 567,89", AmountPolicy::Positive), Some(dec("1234567.89")));
        assert_eq!(parse_amount("500000.00", AmountPolicy::Positive), Some(dec("500000")));
        assert_eq!(parse_amount("\u{a0}12\u{a0}500 тг.", AmountPolicy::Positive), Some(dec("12500")));
    }

    #[test]
    fn amount_keeps_two_fraction_digits() {
        let value = parse_amount("1 500", AmountPolicy::Positive).unwrap();
        assert_eq!(value.scale(), 2);
        assert_eq!(value.to_string(), "1500.00");
    }

    #[test]
    fn amount_dotted_thousands() {
        assert_eq!(parse_amount("1.234.567.89", AmountPolicy::Positive), Some(dec("1234567.89")));
    }

    #[test]
    fn amount_absent_inputs() {
        assert_eq!(parse_amount("", AmountPolicy::Positive), None);
        assert_eq!(parse_amount("   ", AmountPolicy::Any), None);
        assert_eq!(parse_amount("не указано", AmountPolicy::Any), None);
        assert_eq!(parse_amount("...", AmountPolicy::Any), None);
    }

    #[test]
    fn amount_policy_controls_zero() {
        assert_eq!(parse_amount("0,00", AmountPolicy::Positive), None);
        assert_eq!(parse_amount("0,00", AmountPolicy::Any), Some(Decimal::ZERO));
    }

    #[test]
    fn date_formats() {
        let d = parse_date("15.03.2024 12:00").unwrap();
        assert_eq!((d.year(), d.month(), d.day(), d.hour()), (2024, 3, 15, 12));

        let d = parse_date("01.02.2023").unwrap();
        assert_eq!((d.year(), d.month(), d.day(), d.hour()), (2023, 2, 1, 0));

        let d = parse_date("2024-06-01 08:30:15").unwrap();
        assert_eq!((d.hour(), d.minute(), d.second()), (8, 30, 15));

        assert!(parse_date("2024-06-01").is_some());
    }

    #[test]
    fn date_absent_inputs() {
        assert_eq!(parse_date("-"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date(" - "), None);
        assert_eq!(parse_date("32.13.2024"), None);
        assert_eq!(parse_date("15.03.2024 12:00 extra"), None);
    }

    #[test]
    fn year_tokens() {
        assert_eq!(parse_year("2024"), Some(2024));
        assert_eq!(parse_year("финансовый год 2025"), Some(2025));
        assert_eq!(parse_year("год 2025 финансовый"), Some(2025));
        assert_eq!(parse_year(""), None);
        assert_eq!(parse_year("1999"), None);
        assert_eq!(parse_year("120250"), None);
    }

    #[test]
    fn tax_id_tokens() {
        assert_eq!(
            extract_tax_id("ГУ \"Отдел образования\" БИН 123456789012"),
            Some("123456789012".to_string())
        );
        assert_eq!(extract_tax_id("1234567890123"), None);
        assert_eq!(extract_tax_id("12345"), None);
        assert_eq!(extract_tax_id(""), None);
    }
}
