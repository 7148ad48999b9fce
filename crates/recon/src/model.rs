use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

use crate::normalize::round2;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A cell value as handed over by the parsing collaborator.
///
/// Spreadsheets give typed numbers, CSV and XML give text. Both are
/// normalized by the engine, never by the loaders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Text form used for key fields. Integer-valued floats are written as
    /// plain integers, never in exponent form.
    pub fn to_key_text(&self) -> String {
        match self {
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 => format!("{n:.0}"),
            Self::Number(n) => format!("{n}"),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// One row extracted from a source file, before any normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub date: Option<RawValue>,
    #[serde(default)]
    pub series: Option<RawValue>,
    #[serde(default)]
    pub number: Option<RawValue>,
    #[serde(default)]
    pub value: Option<RawValue>,
    #[serde(default)]
    pub tax_base: Option<RawValue>,
    #[serde(default)]
    pub tax_amount: Option<RawValue>,
    /// Only meaningful for the canonical source.
    #[serde(default)]
    pub cancelled: bool,
    /// Where the row came from (file name, `archive.zip:member.xml`, sheet row).
    #[serde(default)]
    pub origin: Option<String>,
}

/// Pre-loaded rows: the canonical set plus secondary sources by name.
///
/// A configured source missing from `sources` was never supplied.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub canonical: Option<Vec<RawRow>>,
    pub sources: BTreeMap<String, Vec<RawRow>>,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Join key across sources. Both parts are already key-normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MatchKey {
    pub series: String,
    pub number: String,
}

impl std::fmt::Display for MatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.series, self.number)
    }
}

/// A document from the authoritative (government XML) source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub date: Option<NaiveDate>,
    pub series: String,
    pub number: String,
    pub value: Option<f64>,
    pub tax_base: Option<f64>,
    pub tax_amount: Option<f64>,
    pub cancelled: bool,
}

impl CanonicalRecord {
    pub fn key(&self) -> MatchKey {
        MatchKey {
            series: self.series.clone(),
            number: self.number.clone(),
        }
    }
}

/// A document as seen by one secondary system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRecord {
    pub source: String,
    pub date: Option<NaiveDate>,
    pub series: String,
    pub number: String,
    pub value: Option<f64>,
    pub tax_base: Option<f64>,
    pub tax_amount: Option<f64>,
}

impl CandidateRecord {
    pub fn key(&self) -> MatchKey {
        MatchKey {
            series: self.series.clone(),
            number: self.number.clone(),
        }
    }

    pub fn snapshot(&self) -> CandidateSnapshot {
        CandidateSnapshot {
            date: self.date,
            value: self.value.map(round2),
            tax_base: self.tax_base.map(round2),
            tax_amount: self.tax_amount.map(round2),
        }
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    SourceUnavailable,
    NotFound,
    Multiple,
    Found,
}

impl MatchStatus {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::SourceUnavailable | Self::NotFound)
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceUnavailable => write!(f, "SOURCE_UNAVAILABLE"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Multiple => write!(f, "MULTIPLE"),
            Self::Found => write!(f, "FOUND"),
        }
    }
}

/// Result of looking up one canonical record in one source.
#[derive(Debug, Clone, Copy)]
pub struct MatchOutcome<'a> {
    pub status: MatchStatus,
    pub candidate: Option<&'a CandidateRecord>,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompareField {
    Value,
    TaxBase,
    TaxAmount,
}

impl std::fmt::Display for CompareField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value => write!(f, "value"),
            Self::TaxBase => write!(f, "tax base"),
            Self::TaxAmount => write!(f, "tax amount"),
        }
    }
}

/// Why an alert was raised. Serialized as its display string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertReason {
    SourceUnavailable { source: String },
    NotFound { source: String },
    MultipleCandidates { source: String },
    Divergence { field: CompareField, source: String },
}

impl AlertReason {
    pub fn source(&self) -> &str {
        match self {
            Self::SourceUnavailable { source }
            | Self::NotFound { source }
            | Self::MultipleCandidates { source }
            | Self::Divergence { source, .. } => source,
        }
    }

    pub fn is_divergence(&self) -> bool {
        matches!(self, Self::Divergence { .. })
    }
}

impl std::fmt::Display for AlertReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceUnavailable { source } => write!(f, "source {source} unavailable"),
            Self::NotFound { source } => write!(f, "not found in source {source}"),
            Self::MultipleCandidates { source } => {
                write!(f, "multiple candidates in source {source}")
            }
            Self::Divergence { field, source } => write!(f, "{field} divergence in source {source}"),
        }
    }
}

impl Serialize for AlertReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Fields of the candidate a source was matched against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSnapshot {
    pub date: Option<NaiveDate>,
    pub value: Option<f64>,
    pub tax_base: Option<f64>,
    pub tax_amount: Option<f64>,
}

/// One discrepancy for one canonical record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEntry {
    pub series: String,
    pub number: String,
    pub date: Option<NaiveDate>,
    pub value: Option<f64>,
    pub tax_base: Option<f64>,
    pub tax_amount: Option<f64>,
    pub statuses: BTreeMap<String, MatchStatus>,
    pub reason: AlertReason,
    pub candidates: BTreeMap<String, Option<CandidateSnapshot>>,
}

impl AlertEntry {
    pub fn key(&self) -> MatchKey {
        MatchKey {
            series: self.series.clone(),
            number: self.number.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics + Output
// ---------------------------------------------------------------------------

/// Counts over distinct match keys, never over alert rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub total_records: usize,
    pub reconciled_count: usize,
    pub divergent_count: usize,
    pub absent_count: BTreeMap<String, usize>,
    pub multiple_count: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub sources: Vec<String>,
    pub canonical_rows: usize,
    pub cancelled_rows: usize,
    /// Rows dropped for lacking a usable key, by source (`canonical` included).
    pub dropped_rows: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub metrics: Metrics,
    pub alerts: Vec<AlertEntry>,
}

impl ReconResult {
    pub fn is_clean(&self) -> bool {
        self.alerts.is_empty()
    }
}
