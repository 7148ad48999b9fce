use crate::model::{CandidateRecord, CanonicalRecord, MatchStatus};

/// Weight of the value term. Value is the most reliable signal; base and tax
/// only corroborate.
const VALUE_WEIGHT: f64 = 100.0;

/// Bonus for an equal emission date. Small enough never to decide alone.
const SAME_DATE_BONUS: f64 = 0.5;

/// Pick the candidate closest to `canonical` among same-key candidates.
///
/// - none → `(None, NotFound)`
/// - one → `(Some, Found)`
/// - several → lowest [`distance`], first one on ties → `(Some, Multiple)`
pub fn select_best<'a>(
    canonical: &CanonicalRecord,
    candidates: &'a [CandidateRecord],
) -> (Option<&'a CandidateRecord>, MatchStatus) {
    match candidates {
        [] => (None, MatchStatus::NotFound),
        [only] => (Some(only), MatchStatus::Found),
        _ => {
            let mut best: Option<(&CandidateRecord, f64)> = None;
            for candidate in candidates {
                let score = distance(canonical, candidate);
                // Strict less-than keeps the earliest candidate on ties.
                if best.map_or(true, |(_, s)| score < s) {
                    best = Some((candidate, score));
                }
            }
            (best.map(|(c, _)| c), MatchStatus::Multiple)
        }
    }
}

/// Weighted distance between a canonical record and a candidate.
///
/// `100·|Δvalue| + |Δbase| + |Δtax| − 0.5·[same date]`. A term is 0 when
/// either side is missing.
pub fn distance(canonical: &CanonicalRecord, candidate: &CandidateRecord) -> f64 {
    let value = abs_delta(canonical.value, candidate.value);
    let base = abs_delta(canonical.tax_base, candidate.tax_base);
    let tax = abs_delta(canonical.tax_amount, candidate.tax_amount);

    let date_bonus = match (canonical.date, candidate.date) {
        (Some(a), Some(b)) if a == b => SAME_DATE_BONUS,
        _ => 0.0,
    };

    VALUE_WEIGHT * value + base + tax - date_bonus
}

fn abs_delta(a: Option<f64>, b: Option<f64>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs(),
        _ => 0.0,
    }
}
