//! Record set building: raw rows → typed records → per-key candidate index.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::AmountScale;
use crate::model::{CandidateRecord, CanonicalRecord, MatchKey, RawRow, RawValue};
use crate::normalize::{detect_cents_scaling, normalize_amount, normalize_date, normalize_key};

// ---------------------------------------------------------------------------
// Canonical set
// ---------------------------------------------------------------------------

/// Canonical records ready for reconciliation. Cancelled documents are
/// already filtered out and only counted.
#[derive(Debug, Clone, Default)]
pub struct CanonicalSet {
    pub records: Vec<CanonicalRecord>,
    pub cancelled: usize,
    pub dropped: usize,
}

/// Normalize canonical rows. Amounts are never rescaled here.
pub fn prepare_canonical(rows: &[RawRow]) -> CanonicalSet {
    let mut set = CanonicalSet::default();

    for row in rows {
        let Some((series, number)) = row_key(row) else {
            warn!(
                "canonical row {} has no usable series/number, dropped",
                row.origin.as_deref().unwrap_or("?")
            );
            set.dropped += 1;
            continue;
        };

        if row.cancelled {
            debug!("canonical {series}/{number} is cancelled, excluded");
            set.cancelled += 1;
            continue;
        }

        set.records.push(CanonicalRecord {
            date: row.date.as_ref().and_then(normalize_date),
            series,
            number,
            value: amount(&row.value, 1.0),
            tax_base: amount(&row.tax_base, 1.0),
            tax_amount: amount(&row.tax_amount, 1.0),
            cancelled: false,
        });
    }

    set
}

// ---------------------------------------------------------------------------
// Secondary sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PreparedSource {
    pub records: Vec<CandidateRecord>,
    pub dropped: usize,
}

/// Normalize a secondary source's rows, applying its amount scale.
///
/// Rows without a series or number are dropped. With `AmountScale::Detect`
/// each amount column is tested on its own, over the kept rows only.
pub fn prepare_candidates(source: &str, rows: &[RawRow], scale: AmountScale) -> PreparedSource {
    let mut kept: Vec<(&RawRow, String, String)> = Vec::with_capacity(rows.len());
    let mut dropped = 0;

    for row in rows {
        match row_key(row) {
            Some((series, number)) => kept.push((row, series, number)),
            None => {
                warn!(
                    "source {source}: row {} has no usable series/number, dropped",
                    row.origin.as_deref().unwrap_or("?")
                );
                dropped += 1;
            }
        }
    }

    let value_factor = column_factor(source, "value", kept.iter().map(|(r, _, _)| &r.value), scale);
    let base_factor = column_factor(source, "tax_base", kept.iter().map(|(r, _, _)| &r.tax_base), scale);
    let tax_factor = column_factor(source, "tax_amount", kept.iter().map(|(r, _, _)| &r.tax_amount), scale);

    let records = kept
        .into_iter()
        .map(|(row, series, number)| CandidateRecord {
            source: source.to_string(),
            date: row.date.as_ref().and_then(normalize_date),
            series,
            number,
            value: amount(&row.value, value_factor),
            tax_base: amount(&row.tax_base, base_factor),
            tax_amount: amount(&row.tax_amount, tax_factor),
        })
        .collect();

    PreparedSource { records, dropped }
}

fn column_factor<'a>(
    source: &str,
    column: &str,
    cells: impl Iterator<Item = &'a Option<RawValue>>,
    scale: AmountScale,
) -> f64 {
    match scale {
        AmountScale::Units => 1.0,
        AmountScale::Cents => 100.0,
        AmountScale::Detect => {
            let values: Vec<f64> = cells.filter_map(|c| c.as_ref().and_then(normalize_amount)).collect();
            let cents = detect_cents_scaling(&values);
            debug!("source {source}: column {column} cents-scaled = {cents} ({} values)", values.len());
            if cents {
                100.0
            } else {
                1.0
            }
        }
    }
}

/// Parsed and scaled, not rounded: tolerance checks see the exact value.
fn amount(cell: &Option<RawValue>, divisor: f64) -> Option<f64> {
    cell.as_ref().and_then(normalize_amount).map(|v| v / divisor)
}

fn row_key(row: &RawRow) -> Option<(String, String)> {
    let series = key_field(&row.series)?;
    let number = key_field(&row.number)?;
    Some((series, number))
}

fn key_field(cell: &Option<RawValue>) -> Option<String> {
    let key = normalize_key(&cell.as_ref()?.to_key_text());
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// All candidates of one source, grouped by match key.
///
/// Duplicates are kept in input order; the selector relies on that order for
/// tie-breaking.
#[derive(Debug, Clone)]
pub struct SourceIndex {
    source: String,
    groups: BTreeMap<MatchKey, Vec<CandidateRecord>>,
    rows: usize,
}

/// Group candidates by `(series, number)`.
pub fn build_index(source: &str, candidates: Vec<CandidateRecord>) -> SourceIndex {
    let rows = candidates.len();
    let mut groups: BTreeMap<MatchKey, Vec<CandidateRecord>> = BTreeMap::new();
    for candidate in candidates {
        groups.entry(candidate.key()).or_default().push(candidate);
    }

    debug!("source {source}: {rows} rows under {} keys", groups.len());

    SourceIndex {
        source: source.to_string(),
        groups,
        rows,
    }
}

impl SourceIndex {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Candidates sharing `key`; empty when the key is absent.
    pub fn get(&self, key: &MatchKey) -> &[CandidateRecord] {
        self.groups.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Number of candidate rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn key_count(&self) -> usize {
        self.groups.len()
    }

    /// Keys held by more than one candidate.
    pub fn duplicate_keys(&self) -> impl Iterator<Item = (&MatchKey, usize)> {
        self.groups
            .iter()
            .filter(|(_, v)| v.len() > 1)
            .map(|(k, v)| (k, v.len()))
    }
}
