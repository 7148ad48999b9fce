use std::collections::{BTreeMap, BTreeSet};

use crate::model::{AlertEntry, CanonicalRecord, MatchKey, MatchStatus, Metrics};

/// Derive run metrics from the canonical set and the alert list.
///
/// Every count is over distinct `(series, number)` keys; one record may carry
/// several alert rows. Each name in `sources` appears in the per-source maps,
/// with 0 when nothing was absent.
pub fn aggregate(canonical: &[CanonicalRecord], alerts: &[AlertEntry], sources: &[String]) -> Metrics {
    let total: BTreeSet<MatchKey> = canonical
        .iter()
        .filter(|r| !r.cancelled)
        .map(CanonicalRecord::key)
        .collect();

    let mut alerted: BTreeSet<MatchKey> = BTreeSet::new();
    let mut divergent: BTreeSet<MatchKey> = BTreeSet::new();
    let mut absent: BTreeMap<&str, BTreeSet<MatchKey>> = BTreeMap::new();
    let mut multiple: BTreeMap<&str, BTreeSet<MatchKey>> = BTreeMap::new();

    for alert in alerts {
        let key = alert.key();
        if alert.reason.is_divergence() {
            divergent.insert(key.clone());
        }
        for (source, status) in &alert.statuses {
            match status {
                s if s.is_absent() => {
                    absent.entry(source.as_str()).or_default().insert(key.clone());
                }
                MatchStatus::Multiple => {
                    multiple.entry(source.as_str()).or_default().insert(key.clone());
                }
                _ => {}
            }
        }
        alerted.insert(key);
    }

    let per_source = |sets: &BTreeMap<&str, BTreeSet<MatchKey>>| -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = sources.iter().map(|s| (s.clone(), 0)).collect();
        for (source, keys) in sets {
            counts.insert(source.to_string(), keys.len());
        }
        counts
    };

    Metrics {
        total_records: total.len(),
        reconciled_count: total.len().saturating_sub(alerted.len()),
        divergent_count: divergent.len(),
        absent_count: per_source(&absent),
        multiple_count: per_source(&multiple),
    }
}
