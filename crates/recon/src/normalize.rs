//! Value and key normalization.
//!
//! Every source goes through the same functions here. Keeping one definition
//! per normalization is what makes keys from XML, CSV and XLSX comparable.

use chrono::NaiveDate;

use crate::model::RawValue;

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

/// Currency markers stripped before numeric parsing. Longest first.
const CURRENCY_MARKERS: &[&str] = &["US$", "R$", "$", "€", "£"];

/// Normalize a raw cell into an amount. Numbers pass through untouched.
pub fn normalize_amount(raw: &RawValue) -> Option<f64> {
    match raw {
        RawValue::Number(n) if n.is_finite() => Some(*n),
        RawValue::Number(_) => None,
        RawValue::Text(s) => parse_amount(s),
    }
}

/// Parse a monetary string in either dot-decimal or comma-decimal notation.
///
/// - both `,` and `.` present: `.` groups thousands, `,` is the decimal mark
/// - only `,`: decimal mark
/// - only `.` or neither: parsed as-is, so `"43.00"` stays 43.00
/// - `(12,50)` is negative
///
/// Returns `None` when anything other than a number remains.
pub fn parse_amount(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (is_negative, inner) = if trimmed.starts_with('(') && trimmed.ends_with(')') {
        (true, &trimmed[1..trimmed.len() - 1])
    } else {
        (false, trimmed)
    };

    let mut text = inner.to_string();
    for marker in CURRENCY_MARKERS {
        text = text.replace(marker, "");
    }
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }

    let has_comma = cleaned.contains(',');
    let has_dot = cleaned.contains('.');
    let canonical = match (has_comma, has_dot) {
        (true, true) => cleaned.replace('.', "").replace(',', "."),
        (true, false) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    for (i, c) in canonical.chars().enumerate() {
        match c {
            '0'..='9' | '.' => {}
            '-' | '+' if i == 0 && !is_negative => {}
            _ => return None,
        }
    }

    let value: f64 = canonical.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if is_negative { -value } else { value })
}

/// Round to two decimal places (cents).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Heuristic for columns stored in minor units: median above 1000 and more
/// than 90% of the values whole numbers.
pub fn detect_cents_scaling(values: &[f64]) -> bool {
    if values.is_empty() {
        return false;
    }

    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    let whole = values.iter().filter(|v| v.fract() == 0.0).count();
    let whole_ratio = whole as f64 / values.len() as f64;

    median > 1000.0 && whole_ratio > 0.9
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Accepted date layouts, tried in order against the date part of a cell.
/// Two-digit years come before four-digit ones so `%Y` never reads `26` as
/// year 26; ISO comes last so `08-01-26` is not taken as year 8.
const DATE_FORMATS: &[&str] = &[
    "%d/%m/%y",
    "%d-%m-%y",
    "%d.%m.%y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
];

/// Normalize a raw cell into a calendar date.
///
/// Accepts ISO-8601 dates and datetimes (time and offset are dropped) and
/// day-first locale dates (`08/01/2026`, `8-1-26`, `08.01.2026 10:30`).
pub fn normalize_date(raw: &RawValue) -> Option<NaiveDate> {
    match raw {
        RawValue::Text(s) => parse_date(s),
        RawValue::Number(_) => None,
    }
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let date_part = s.trim().split(['T', ' ']).next()?;
    if date_part.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Canonical form of a series or number field.
///
/// Drops a float artifact suffix (`"201.0"`), keeps digits only and strips
/// leading zeros. Input without any digit comes back trimmed but otherwise
/// untouched. Idempotent.
pub fn normalize_key(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_suffix = strip_float_suffix(trimmed);

    let digits: String = without_suffix.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return trimmed.to_string();
    }

    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        "0".to_string()
    } else {
        significant.to_string()
    }
}

fn strip_float_suffix(s: &str) -> &str {
    match s.rfind('.') {
        Some(dot) if dot > 0 => {
            let tail = &s[dot + 1..];
            if !tail.is_empty() && tail.bytes().all(|b| b == b'0') {
                &s[..dot]
            } else {
                s
            }
        }
        _ => s,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
