use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::classify::{divergences, outcome_reason};
use crate::config::ReconConfig;
use crate::index::{build_index, prepare_canonical, prepare_candidates, SourceIndex};
use crate::matcher::select_best;
use crate::metrics::aggregate;
use crate::normalize::round2;
use crate::model::{
    AlertEntry, AlertReason, CanonicalRecord, MatchOutcome, MatchStatus, ReconInput, ReconMeta,
    ReconResult,
};

/// One configured secondary source. `index` is `None` when the source was
/// never supplied.
#[derive(Debug, Clone, Copy)]
pub struct SecondarySource<'a> {
    pub name: &'a str,
    pub index: Option<&'a SourceIndex>,
}

/// Run reconciliation per config: normalize, index, reconcile, aggregate.
///
/// Never fails. Missing canonical data yields an empty result; missing or
/// empty sources degrade to `SourceUnavailable`.
pub fn run(config: &ReconConfig, input: &ReconInput) -> ReconResult {
    let source_names = config.source_names();
    let mut dropped_rows: BTreeMap<String, usize> = BTreeMap::new();

    for name in input.sources.keys() {
        if !source_names.contains(name) {
            warn!("input source '{name}' is not configured, ignored");
        }
    }

    let canonical_rows = input.canonical.as_ref().map_or(0, |rows| rows.len());
    let canonical = match &input.canonical {
        Some(rows) => prepare_canonical(rows),
        None => {
            warn!("no canonical data supplied");
            Default::default()
        }
    };
    if canonical.dropped > 0 {
        dropped_rows.insert("canonical".into(), canonical.dropped);
    }

    // Index every supplied source
    let mut indexes: Vec<(String, Option<SourceIndex>)> = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        let index = input.sources.get(&source.name).map(|rows| {
            let prepared = prepare_candidates(&source.name, rows, source.scale);
            if prepared.dropped > 0 {
                dropped_rows.insert(source.name.clone(), prepared.dropped);
            }
            build_index(&source.name, prepared.records)
        });
        match &index {
            None => warn!("source {} not supplied", source.name),
            Some(idx) if idx.is_empty() => warn!("source {} supplied but has no usable rows", source.name),
            Some(idx) => debug!("source {}: {} duplicate keys", source.name, idx.duplicate_keys().count()),
        }
        indexes.push((source.name.clone(), index));
    }

    let sources: Vec<SecondarySource<'_>> = indexes
        .iter()
        .map(|(name, index)| SecondarySource {
            name: name.as_str(),
            index: index.as_ref(),
        })
        .collect();

    let alerts = reconcile(&canonical.records, &sources, config.tolerance.amount);
    let metrics = aggregate(&canonical.records, &alerts, &source_names);

    info!(
        "{} records: {} reconciled, {} divergent, {} alerts",
        metrics.total_records,
        metrics.reconciled_count,
        metrics.divergent_count,
        alerts.len()
    );

    ReconResult {
        meta: ReconMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            sources: source_names,
            canonical_rows,
            cancelled_rows: canonical.cancelled,
            dropped_rows,
        },
        metrics,
        alerts,
    }
}

/// Reconcile canonical records against every source.
///
/// Returns alerts deduplicated on full-row equality and sorted by
/// `(series, number, reason)`. Cancelled records are skipped.
pub fn reconcile(
    canonical: &[CanonicalRecord],
    sources: &[SecondarySource<'_>],
    tolerance: f64,
) -> Vec<AlertEntry> {
    // Records are independent: alerts are collected per record and
    // concatenated, and the final sort makes the order irrelevant.
    let alerts: Vec<AlertEntry> = canonical
        .iter()
        .filter(|record| !record.cancelled)
        .flat_map(|record| reconcile_record(record, sources, tolerance))
        .collect();

    finalize(alerts)
}

/// Look up one record in one source.
pub fn match_source<'a>(record: &CanonicalRecord, source: &SecondarySource<'a>) -> MatchOutcome<'a> {
    match source.index {
        Some(index) if !index.is_empty() => {
            let (candidate, status) = select_best(record, index.get(&record.key()));
            MatchOutcome { status, candidate }
        }
        _ => MatchOutcome {
            status: MatchStatus::SourceUnavailable,
            candidate: None,
        },
    }
}

fn reconcile_record(
    record: &CanonicalRecord,
    sources: &[SecondarySource<'_>],
    tolerance: f64,
) -> Vec<AlertEntry> {
    let outcomes: Vec<(&str, MatchOutcome<'_>)> = sources
        .iter()
        .map(|source| (source.name, match_source(record, source)))
        .collect();

    let mut reasons: Vec<AlertReason> = Vec::new();
    for (name, outcome) in &outcomes {
        if let Some(reason) = outcome_reason(outcome.status, name) {
            reasons.push(reason);
        }
        if let Some(candidate) = outcome.candidate {
            reasons.extend(divergences(record, candidate, tolerance));
        }
    }

    if reasons.is_empty() {
        return Vec::new();
    }

    let statuses: BTreeMap<String, MatchStatus> = outcomes
        .iter()
        .map(|(name, outcome)| (name.to_string(), outcome.status))
        .collect();
    let candidates = outcomes
        .iter()
        .map(|(name, outcome)| (name.to_string(), outcome.candidate.map(|c| c.snapshot())))
        .collect::<BTreeMap<_, _>>();

    reasons
        .into_iter()
        .map(|reason| AlertEntry {
            series: record.series.clone(),
            number: record.number.clone(),
            date: record.date,
            value: record.value.map(round2),
            tax_base: record.tax_base.map(round2),
            tax_amount: record.tax_amount.map(round2),
            statuses: statuses.clone(),
            reason,
            candidates: candidates.clone(),
        })
        .collect()
}

/// Stable sort by `(series, number, reason)`, then drop exact duplicates.
fn finalize(alerts: Vec<AlertEntry>) -> Vec<AlertEntry> {
    let mut keyed: Vec<(String, AlertEntry)> = alerts
        .into_iter()
        .map(|alert| (alert.reason.to_string(), alert))
        .collect();
    keyed.sort_by(|(ra, a), (rb, b)| {
        (&a.series, &a.number, ra).cmp(&(&b.series, &b.number, rb))
    });

    // Identical rows share a sort key, so they sit in the same run; compare
    // within the run to catch non-adjacent repeats.
    let mut out: Vec<AlertEntry> = Vec::with_capacity(keyed.len());
    let mut run_start = 0;
    for (reason, alert) in keyed {
        let same_run = out.last().is_some_and(|last: &AlertEntry| {
            last.series == alert.series && last.number == alert.number && last.reason.to_string() == reason
        });
        if !same_run {
            run_start = out.len();
        }
        if !out[run_start..].contains(&alert) {
            out.push(alert);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AmountScale, SourceConfig};
    use crate::model::{CandidateRecord, RawRow, RawValue};

    fn record(series: &str, number: &str, value: f64) -> CanonicalRecord {
        CanonicalRecord {
            date: None,
            series: series.into(),
            number: number.into(),
            value: Some(value),
            tax_base: None,
            tax_amount: None,
            cancelled: false,
        }
    }

    fn cand(source: &str, series: &str, number: &str, value: f64) -> CandidateRecord {
        CandidateRecord {
            source: source.into(),
            date: None,
            series: series.into(),
            number: number.into(),
            value: Some(value),
            tax_base: None,
            tax_amount: None,
        }
    }

    fn raw(series: &str, number: &str, value: &str) -> RawRow {
        RawRow {
            series: Some(RawValue::from(series)),
            number: Some(RawValue::from(number)),
            value: Some(RawValue::from(value)),
            ..RawRow::default()
        }
    }

    fn reasons(alerts: &[AlertEntry]) -> Vec<String> {
        alerts.iter().map(|a| a.reason.to_string()).collect()
    }

    #[test]
    fn found_is_silent_and_missing_source_alerts() {
        let a = build_index("A", vec![cand("A", "1", "201", 100.0)]);
        let sources = [
            SecondarySource { name: "A", index: Some(&a) },
            SecondarySource { name: "B", index: None },
        ];
        let alerts = reconcile(&[record("1", "201", 100.0)], &sources, 0.01);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].statuses["A"], MatchStatus::Found);
        assert_eq!(alerts[0].statuses["B"], MatchStatus::SourceUnavailable);
        assert!(alerts[0].reason.to_string().contains("source B"));
        assert!(alerts[0].candidates["A"].is_some());
        assert!(alerts[0].candidates["B"].is_none());
    }

    #[test]
    fn empty_index_is_unavailable() {
        let empty = build_index("B", Vec::new());
        let source = SecondarySource { name: "B", index: Some(&empty) };
        let outcome = match_source(&record("1", "1", 1.0), &source);
        assert_eq!(outcome.status, MatchStatus::SourceUnavailable);
        assert!(outcome.candidate.is_none());
    }

    #[test]
    fn not_found_when_key_absent() {
        let a = build_index("A", vec![cand("A", "1", "999", 100.0)]);
        let sources = [SecondarySource { name: "A", index: Some(&a) }];
        let alerts = reconcile(&[record("1", "201", 100.0)], &sources, 0.01);
        assert_eq!(reasons(&alerts), vec!["not found in source A"]);
        assert_eq!(alerts[0].statuses["A"], MatchStatus::NotFound);
    }

    #[test]
    fn multiple_is_informational_then_compared() {
        let a = build_index(
            "A",
            vec![cand("A", "1", "201", 99.5), cand("A", "1", "201", 100.0)],
        );
        let sources = [SecondarySource { name: "A", index: Some(&a) }];
        let alerts = reconcile(&[record("1", "201", 100.0)], &sources, 0.01);

        assert_eq!(reasons(&alerts), vec!["multiple candidates in source A"]);
        let snap = alerts[0].candidates["A"].as_ref().unwrap();
        assert_eq!(snap.value, Some(100.0));
    }

    #[test]
    fn alerts_from_several_sources_stay_separate() {
        let a = build_index("A", vec![cand("A", "1", "5", 10.0)]);
        let b = build_index("B", vec![cand("B", "1", "7", 10.0)]);
        let sources = [
            SecondarySource { name: "A", index: Some(&a) },
            SecondarySource { name: "B", index: Some(&b) },
        ];
        let alerts = reconcile(&[record("1", "5", 12.0)], &sources, 0.01);
        assert_eq!(
            reasons(&alerts),
            vec!["not found in source B", "value divergence in source A"]
        );
        assert!(alerts.iter().all(|a| a.number == "5"));
    }

    #[test]
    fn sorted_by_key_then_reason() {
        let sources = [SecondarySource { name: "A", index: None }];
        let alerts = reconcile(
            &[record("2", "1", 1.0), record("1", "9", 1.0), record("1", "10", 1.0)],
            &sources,
            0.01,
        );
        let keys: Vec<(String, String)> =
            alerts.iter().map(|a| (a.series.clone(), a.number.clone())).collect();
        assert_eq!(
            keys,
            vec![
                ("1".to_string(), "10".to_string()),
                ("1".to_string(), "9".to_string()),
                ("2".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn exact_duplicate_rows_collapse() {
        let sources = [SecondarySource { name: "A", index: None }];
        let alerts = reconcile(
            &[record("1", "1", 5.0), record("1", "1", 6.0), record("1", "1", 5.0)],
            &sources,
            0.01,
        );
        // Same key, same reason, but the 6.0 row differs in value
        assert_eq!(alerts.len(), 2);
    }

    #[test]
    fn cancelled_records_skipped() {
        let mut r = record("1", "1", 5.0);
        r.cancelled = true;
        let sources = [SecondarySource { name: "A", index: None }];
        assert!(reconcile(&[r], &sources, 0.01).is_empty());
    }

    #[test]
    fn run_without_canonical_is_empty() {
        let config = ReconConfig::new("t", vec![SourceConfig::new("A", AmountScale::Units)]);
        let result = run(&config, &ReconInput::default());
        assert!(result.alerts.is_empty());
        assert_eq!(result.metrics.total_records, 0);
        assert_eq!(result.metrics.reconciled_count, 0);
        assert_eq!(result.meta.canonical_rows, 0);
    }

    #[test]
    fn run_normalizes_keys_and_amounts() {
        let config = ReconConfig::new(
            "t",
            vec![
                SourceConfig::new("A", AmountScale::Units),
                SourceConfig::new("B", AmountScale::Cents),
            ],
        );
        let input = ReconInput {
            canonical: Some(vec![raw("0201", "015186", "1.234,56")]),
            sources: BTreeMap::from([
                ("A".to_string(), vec![raw("201", "15186", "1234.56")]),
                ("B".to_string(), vec![raw("201.0", "15186.0", "123456")]),
            ]),
        };
        let result = run(&config, &input);
        assert!(result.is_clean(), "unexpected alerts: {:?}", reasons(&result.alerts));
        assert_eq!(result.metrics.total_records, 1);
        assert_eq!(result.metrics.reconciled_count, 1);
    }

    #[test]
    fn sub_cent_gap_diverges_and_reports_cents() {
        let config = ReconConfig::new("t", vec![SourceConfig::new("A", AmountScale::Units)]);
        let input = ReconInput {
            canonical: Some(vec![raw("1", "1", "100.004")]),
            sources: BTreeMap::from([("A".to_string(), vec![raw("1", "1", "100.016")])]),
        };
        let result = run(&config, &input);
        assert_eq!(reasons(&result.alerts), vec!["value divergence in source A"]);
        let alert = &result.alerts[0];
        assert_eq!(alert.value, Some(100.0));
        assert_eq!(alert.candidates["A"].as_ref().unwrap().value, Some(100.02));
    }

    #[test]
    fn run_records_dropped_rows() {
        let config = ReconConfig::new("t", vec![SourceConfig::new("A", AmountScale::Units)]);
        let keyless = RawRow {
            value: Some(RawValue::from("1")),
            ..RawRow::default()
        };
        let input = ReconInput {
            canonical: Some(vec![raw("1", "1", "1"), keyless.clone()]),
            sources: BTreeMap::from([("A".to_string(), vec![raw("1", "1", "1"), keyless])]),
        };
        let result = run(&config, &input);
        assert_eq!(result.meta.dropped_rows["canonical"], 1);
        assert_eq!(result.meta.dropped_rows["A"], 1);
        assert!(result.is_clean());
    }
}
