use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Anything above this is treated as a corrupted extraction (merged columns,
/// account numbers read as money), never as a real statement amount.
pub const AMOUNT_CEILING: Decimal = Decimal::from_parts(10_000_000, 0, 0, false, 0);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("not a monetary value: {0:?}")]
    Invalid(String),

    #[error("amount {0} exceeds the sanity ceiling")]
    Corrupt(String),
}

/// Parse a statement amount into a `Decimal`.
///
/// Currency markers (`R`, `$`), quotes, whitespace and `,` thousands
/// separators are stripped. A leading `-` or accounting parentheses make the
/// value negative. Magnitudes above [`AMOUNT_CEILING`] are rejected.
pub fn parse_amount(raw: &str) -> Result<Decimal, AmountError> {
    let trimmed = raw.trim().trim_matches('"');
    let (negated, inner) = match trimmed
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };
    let cleaned: String = inner
        .chars()
        .filter(|c| !matches!(c, 'R' | '$' | ',' | ' ' | '\t' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() || cleaned == "-" {
        return Err(AmountError::Invalid(raw.trim().to_string()));
    }
    let value =
        Decimal::from_str(&cleaned).map_err(|_| AmountError::Invalid(raw.trim().to_string()))?;
    if value.abs() > AMOUNT_CEILING {
        return Err(AmountError::Corrupt(raw.trim().to_string()));
    }
    Ok(if negated { -value } else { value })
}

/// Like [`parse_amount`], but an empty cell or a lone `-` placeholder is `None`.
pub fn parse_field(raw: &str) -> Result<Option<Decimal>, AmountError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return Ok(None);
    }
    parse_amount(trimmed).map(Some)
}

pub fn normalize_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Try each chrono format in order; the first that parses wins.
pub fn parse_date(raw: &str, formats: &[&str]) -> Option<NaiveDate> {
    let cleaned = normalize_whitespace(raw);
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
}

/// Parse a `dd Mon` date that carries no year of its own.
pub fn parse_day_month(raw: &str, year: i32) -> Option<NaiveDate> {
    let with_year = format!("{} {year}", normalize_whitespace(raw));
    NaiveDate::parse_from_str(&with_year, "%d %b %Y").ok()
}
